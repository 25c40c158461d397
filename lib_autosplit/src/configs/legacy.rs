//! Conversion of the legacy categories/definitions layout.
//!
//! ```json
//! { "name": "..", "autostart": "start",
//!   "categories": [{ "name": "Any%", "splits": ["kraid", "phantoon"] }],
//!   "definitions": [{ "name": "kraid", "address": "0x79B", "value": "0xA59F", "type": "short", "operator": "==" }] }
//! ```
//!
//! Each category becomes a top-level category node whose children are copies
//! of the named definitions, and the autostart name is replaced by a copy of
//! its definition.

use crate::error::ValidationError;
use crate::splits::model::{AutostartDef, GameDef, SplitDef};

pub fn convert(def: &GameDef) -> Result<GameDef, ValidationError> {
    let mut splits = Vec::with_capacity(def.categories.len());
    for category in &def.categories {
        let children = category
            .splits
            .iter()
            .map(|name| {
                def.definition(name)
                    .cloned()
                    .ok_or_else(|| ValidationError::MissingDefinition {
                        name: name.clone(),
                        referenced_by: format!("category {}", category.name),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if children.is_empty() {
            log::warn!("Category '{}' lists no splits, skipped", category.name);
            continue;
        }
        splits.push(SplitDef {
            name: category.name.clone(),
            children,
            ..SplitDef::default()
        });
    }

    let autostart = match &def.autostart {
        Some(AutostartDef::Name(name)) if name.is_empty() => None,
        Some(AutostartDef::Name(name)) => {
            let split = def
                .definition(name)
                .cloned()
                .ok_or_else(|| ValidationError::MissingDefinition {
                    name: name.clone(),
                    referenced_by: "autostart".to_string(),
                })?;
            Some(AutostartDef::Inline(Box::new(split)))
        }
        other => other.clone(),
    };

    Ok(GameDef {
        name: def.name.clone(),
        settings: def.settings,
        autostart,
        splits,
        min_version: def.min_version.clone(),
        categories: Vec::new(),
        definitions: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::splits::arena::Game;

    const LEGACY: &str = r#"{
        "name": "Super Metroid",
        "autostart": "Start",
        "categories": [
            { "name": "Any%", "splits": ["kraid", "Ridley"] },
            { "name": "100%", "splits": ["ridley"] }
        ],
        "definitions": [
            { "name": "Start", "address": "0x998", "value": "0x1F", "type": "byte", "operator": "==" },
            { "name": "Kraid", "address": "0x79B", "value": "0xA59F", "type": "short", "operator": "==", "repeat": 1 },
            { "name": "Ridley", "address": "0x79B", "value": "0xB32E", "operator": "==" }
        ]
    }"#;

    #[test]
    fn test_categories_become_category_nodes() {
        let def = GameDef::from_json(LEGACY).unwrap();
        assert!(def.is_legacy());

        let converted = convert(&def).unwrap();
        assert!(!converted.is_legacy());
        assert_eq!(converted.splits.len(), 2);
        assert_eq!(converted.splits[0].children[0].name, "Kraid");
        assert!(matches!(converted.autostart, Some(AutostartDef::Inline(ref s)) if s.name == "Start"));

        let mut game = Game::compile(&converted).unwrap();
        game.legacy = true;

        let any = game.runnable(Some("any%"), &|_| true);
        assert_eq!(any.len(), 3);
        let hundred = game.runnable(Some("100%"), &|_| true);
        assert_eq!(hundred.len(), 1);
        // Unknown category falls back to the first one.
        assert_eq!(game.runnable(Some("low%"), &|_| true), any);
        assert_eq!(game.runnable(None, &|_| true), any);
    }

    #[test]
    fn test_missing_autostart_definition() {
        let mut def = GameDef::from_json(LEGACY).unwrap();
        def.autostart = Some(AutostartDef::Name("Ceres".to_string()));
        assert_eq!(
            convert(&def).unwrap_err(),
            ValidationError::MissingDefinition {
                name: "Ceres".to_string(),
                referenced_by: "autostart".to_string(),
            }
        );
    }
}
