// src/migration.rs
//! Relocation of variable references in manager scripts
//!
//! When a property moves from one model type to another (say `Soil.Thickness`
//! to `Physical.Thickness`), scripts that read it through an instance of the
//! old type must be rewritten to go through an instance of the new type. A
//! [`RenameRule`] describes one such move; [`move_variables`] applies a set of
//! rules to one script, adding a `[Link]` declaration for the new instance
//! when the script has none.
//!
//! Rules can be kept in a TOML file:
//!
//! ```toml
//! [[rule]]
//! old_name = "Soil.Thickness"
//! new_name = "physical.Thickness"
//! new_type_name = "Physical"
//! ```

use crate::error::{Error, Result};
use crate::script::parser::{type_matches, Declaration, RegexOptions, ScriptParser};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Attribute marking a declaration the host fills in
pub const LINK_ATTRIBUTE: &str = "[Link]";

/// Move of one member from an owner type to a new instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameRule {
    /// `OwnerType.member`
    pub old_name: String,
    /// `instance.member`, or just `instance` when the member itself becomes the instance
    pub new_name: String,
    /// Type of the instance named by `new_name`
    pub new_type_name: String,
}

impl RenameRule {
    pub fn new(
        old_name: impl Into<String>,
        new_name: impl Into<String>,
        new_type_name: impl Into<String>,
    ) -> Self {
        Self {
            old_name: old_name.into(),
            new_name: new_name.into(),
            new_type_name: new_type_name.into(),
        }
    }

    /// Split `old_name` into owner type and member
    fn old_parts(&self) -> Result<(&str, &str)> {
        let mut tokens = self.old_name.split('.');
        match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(owner), Some(member), None) if !owner.is_empty() && !member.is_empty() => {
                Ok((owner, member))
            }
            _ => Err(Error::InvalidRenameRule(self.old_name.clone())),
        }
    }

    /// Split `new_name` into instance and optional member
    fn new_parts(&self) -> (&str, Option<&str>) {
        match self.new_name.split_once('.') {
            Some((instance, member)) => (instance, Some(member)),
            None => (self.new_name.as_str(), None),
        }
    }
}

/// A TOML file of rename rules
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RenameRules {
    #[serde(default, rename = "rule")]
    pub rules: Vec<RenameRule>,
}

impl RenameRules {
    pub fn from_toml(content: &str) -> Result<Self> {
        let rules: RenameRules = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse rename rules: {}", e)))?;
        for rule in &rules.rules {
            rule.old_parts()?;
        }
        Ok(rules)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read rename rules {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }
}

/// Apply rename rules to a script
///
/// Every rule is validated before the script is touched, so an invalid rule
/// leaves the script unchanged. Returns true if any reference was moved.
pub fn move_variables(parser: &mut ScriptParser, rules: &[RenameRule]) -> Result<bool> {
    let parts = rules
        .iter()
        .map(RenameRule::old_parts)
        .collect::<Result<Vec<_>>>()?;

    let mut declarations = parser.declarations();
    let mut moved = false;

    for (rule, (owner_type, member)) in rules.iter().zip(parts) {
        let pattern = format!(r"(\w+)\.{}(\W+)", regex::escape(member));
        parser.replace_regex_with(
            Some(&pattern),
            |caps| match relocate(&caps[1], &caps[2], owner_type, rule, &mut declarations) {
                Some(replacement) => {
                    moved = true;
                    replacement
                }
                None => caps[0].to_string(),
            },
            RegexOptions::default(),
        )?;
    }

    if moved {
        debug!("Moved variables, rewriting {} declaration(s)", declarations.len());
        parser.set_declarations(&declarations);
    }
    Ok(moved)
}

/// Replacement for one `instance.member` reference, or `None` to leave it
///
/// `declarations` starts as the script's declarations; a declaration for the
/// new instance is appended the first time one is needed.
fn relocate(
    instance: &str,
    boundary: &str,
    owner_type: &str,
    rule: &RenameRule,
    declarations: &mut Vec<Declaration>,
) -> Option<String> {
    let declared = declarations.iter().find(|d| d.instance_name == instance)?;
    if !type_matches(&declared.type_name, owner_type) {
        return None;
    }

    let (new_instance, new_member) = rule.new_parts();
    let position = match declarations
        .iter()
        .position(|d| d.type_name == rule.new_type_name)
    {
        Some(position) => position,
        None => {
            declarations.push(Declaration::new(&rule.new_type_name, new_instance));
            declarations.len() - 1
        }
    };

    let target = &mut declarations[position];
    if !target.attributes.iter().any(|a| a == LINK_ATTRIBUTE) {
        target.attributes.push(LINK_ATTRIBUTE.to_string());
    }

    Some(match new_member {
        Some(member) => format!("{}.{}{}", target.instance_name, member, boundary),
        None => format!("{}{}", target.instance_name, boundary),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOIL_SCRIPT: &str = "using Models.Soils;
namespace Models
{
    public class Script : Model
    {
        [Link] private Soil soil;
        private void OnSowing()
        {
            double[] t = soil.Thickness;
            double x = soil.Thickness[0] + other.Thickness[1];
        }
    }
}
";

    fn thickness_rule() -> RenameRule {
        RenameRule::new("Soil.Thickness", "physical.Thickness", "Physical")
    }

    #[test]
    fn test_move_adds_linked_declaration() {
        let mut parser = ScriptParser::new(SOIL_SCRIPT);
        assert!(move_variables(&mut parser, &[thickness_rule()]).unwrap());
        assert_eq!(
            parser.to_script().unwrap(),
            "using Models.Soils;
namespace Models
{
    public class Script : Model
    {
        [Link] private Soil soil;
        [Link]
        private Physical physical;
        private void OnSowing()
        {
            double[] t = physical.Thickness;
            double x = physical.Thickness[0] + other.Thickness[1];
        }
    }
}
"
        );
    }

    #[test]
    fn test_move_keeps_declarations_in_non_public_class() {
        let script = SOIL_SCRIPT.replace("public class Script", "class S1");
        let mut parser = ScriptParser::new(&script);
        assert!(move_variables(&mut parser, &[thickness_rule()]).unwrap());

        let text = parser.to_script().unwrap();
        assert_eq!(text.matches("class ").count(), 1);
        assert!(text.contains(
            "    class S1 : Model
    {
        [Link] private Soil soil;
        [Link]
        private Physical physical;
        private void OnSowing()
"
        ));
        assert!(text.contains("double[] t = physical.Thickness;"));
    }

    #[test]
    fn test_move_reuses_existing_declaration() {
        let script = SOIL_SCRIPT.replace(
            "        [Link] private Soil soil;\n",
            "        [Link] private Soil soil;\n        private Physical phys;\n",
        );
        let mut parser = ScriptParser::new(&script);
        assert!(move_variables(&mut parser, &[thickness_rule()]).unwrap());

        let text = parser.to_script().unwrap();
        assert!(text.contains("double[] t = phys.Thickness;"));
        assert!(!text.contains("physical"));

        let phys = parser
            .declarations()
            .into_iter()
            .find(|d| d.instance_name == "phys")
            .unwrap();
        assert_eq!(phys.attributes, vec![LINK_ATTRIBUTE]);
    }

    #[test]
    fn test_move_to_instance_without_member() {
        let script = "public class Script : Model
{
    [Link] Weather weather;
    void F()
    {
        double r = weather.Rain;
    }
}
";
        let mut parser = ScriptParser::new(script);
        let rule = RenameRule::new("Weather.Rain", "rain", "Rainfall");
        assert!(move_variables(&mut parser, &[rule]).unwrap());
        assert!(parser.to_script().unwrap().contains("double r = rain;"));
        assert!(parser.declarations().iter().any(|d| d.type_name == "Rainfall"));
    }

    #[test]
    fn test_move_matches_dotted_owner_type() {
        let script = SOIL_SCRIPT.replace("private Soil soil;", "private Models.Soils.Soil soil;");
        let mut parser = ScriptParser::new(&script);
        assert!(move_variables(&mut parser, &[thickness_rule()]).unwrap());
        assert!(parser.to_script().unwrap().contains("double[] t = physical.Thickness;"));
    }

    #[test]
    fn test_move_ignores_other_types() {
        let script = SOIL_SCRIPT.replace("private Soil soil;", "private TopSoil soil;");
        let mut parser = ScriptParser::new(&script);
        assert!(!move_variables(&mut parser, &[thickness_rule()]).unwrap());
        assert_eq!(parser.to_script().unwrap(), script);
    }

    #[test]
    fn test_invalid_rule_leaves_script_untouched() {
        let mut parser = ScriptParser::new(SOIL_SCRIPT);
        let rules = [thickness_rule(), RenameRule::new("Thickness", "x", "X")];

        let err = move_variables(&mut parser, &rules).unwrap_err();
        assert!(matches!(err, Error::InvalidRenameRule(name) if name == "Thickness"));
        assert_eq!(parser.to_script().unwrap(), SOIL_SCRIPT);

        let rules = [RenameRule::new("A.B.C", "x", "X")];
        assert!(move_variables(&mut parser, &rules).is_err());
    }

    #[test]
    fn test_rules_from_toml() {
        let rules = RenameRules::from_toml(
            r#"
[[rule]]
old_name = "Soil.Thickness"
new_name = "physical.Thickness"
new_type_name = "Physical"

[[rule]]
old_name = "Soil.DUL"
new_name = "physical.DUL"
new_type_name = "Physical"
"#,
        )
        .unwrap();
        assert_eq!(rules.rules.len(), 2);
        assert_eq!(rules.rules[0], thickness_rule());

        assert!(RenameRules::from_toml("").unwrap().rules.is_empty());
        assert!(RenameRules::from_toml(
            "[[rule]]\nold_name = \"Thickness\"\nnew_name = \"x\"\nnew_type_name = \"X\"\n"
        )
        .is_err());
    }
}
