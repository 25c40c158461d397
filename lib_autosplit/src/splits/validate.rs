//! Checks a parsed game file before it is compiled: a non-empty split list,
//! a `minVersion` this engine satisfies, and (legacy layout) no dangling name
//! references. Per-node problems are reported when the tree is compiled into
//! its arena.

use crate::error::ValidationError;
use crate::splits::model::{AutostartDef, GameDef};

/// Validates against the running engine version.
pub fn validate(game: &GameDef) -> Result<(), ValidationError> {
    validate_for_version(game, crate::ENGINE_VERSION)
}

pub fn validate_for_version(game: &GameDef, engine_version: &str) -> Result<(), ValidationError> {
    if let Some(required) = game.min_version.as_deref().filter(|v| !v.trim().is_empty()) {
        if is_older(engine_version, required) {
            return Err(ValidationError::VersionTooOld {
                required: required.to_string(),
                current: engine_version.to_string(),
            });
        }
    }

    if game.is_legacy() {
        if game.categories.is_empty() {
            return Err(ValidationError::EmptyConfiguration);
        }
        for category in &game.categories {
            for name in &category.splits {
                if game.definition(name).is_none() {
                    return Err(ValidationError::MissingDefinition {
                        name: name.clone(),
                        referenced_by: format!("category {}", category.name),
                    });
                }
            }
        }
        if let Some(AutostartDef::Name(name)) = &game.autostart {
            if !name.is_empty() && game.definition(name).is_none() {
                return Err(ValidationError::MissingDefinition {
                    name: name.clone(),
                    referenced_by: "autostart".to_string(),
                });
            }
        }
        return Ok(());
    }

    if game.splits.is_empty() {
        return Err(ValidationError::EmptyConfiguration);
    }
    Ok(())
}

/// `true` if `current` is strictly lower than `required`, comparing numeric
/// `major.minor.patch`. Missing or non-numeric parts count as 0 and anything
/// after a `-` or `+` is ignored.
pub fn is_older(current: &str, required: &str) -> bool {
    version_key(current) < version_key(required)
}

fn version_key(version: &str) -> [u64; 3] {
    let core = version
        .trim()
        .trim_start_matches(['v', 'V'])
        .split(['-', '+'])
        .next()
        .unwrap_or_default();

    let mut key = [0; 3];
    for (slot, part) in key.iter_mut().zip(core.split('.')) {
        let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
        *slot = digits.parse().unwrap_or(0);
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::splits::model::{CategoryDef, SplitDef};

    #[test]
    fn test_version_comparison() {
        assert!(is_older("1.2.0", "1.10.0"));
        assert!(is_older("1.2", "1.2.1"));
        assert!(!is_older("1.2.0", "1.2"));
        assert!(!is_older("2.0.0", "1.99.99"));
        assert!(!is_older("v1.3.0-beta", "1.3.0"));
    }

    #[test]
    fn test_min_version_gate() {
        let game = GameDef {
            min_version: Some("9.0.0".to_string()),
            splits: vec![SplitDef::default()],
            ..GameDef::default()
        };
        assert!(matches!(
            validate_for_version(&game, "1.3.0"),
            Err(ValidationError::VersionTooOld { .. })
        ));
        assert!(validate_for_version(&game, "9.0.0").is_ok());
    }

    #[test]
    fn test_empty_configuration() {
        assert_eq!(
            validate(&GameDef::default()),
            Err(ValidationError::EmptyConfiguration)
        );
    }

    #[test]
    fn test_legacy_missing_definition() {
        let game = GameDef {
            categories: vec![CategoryDef {
                name: "Any%".to_string(),
                splits: vec!["kraid".to_string(), "phantoon".to_string()],
            }],
            definitions: vec![SplitDef {
                name: "Kraid".to_string(),
                ..SplitDef::default()
            }],
            ..GameDef::default()
        };
        assert_eq!(
            validate(&game),
            Err(ValidationError::MissingDefinition {
                name: "phantoon".to_string(),
                referenced_by: "category Any%".to_string(),
            })
        );
    }
}
