//! # Split Arena
//!
//! The condition tree resolved into a flat arena of nodes addressed by stable
//! [`SplitId`] indices. Nodes are immutable once built; parents are plain ids,
//! so there are no reference cycles and a loaded game can be shared behind an
//! `Arc` while ticks read it. Run-time progress is kept elsewhere (see
//! `eval::ProgressTable`).

use crate::error::ValidationError;
use crate::splits::model::{AutostartDef, Check, GameDef, GameSettings, SplitDef};

/// Stable index of a node inside its [`SplitArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SplitId(usize);

impl SplitId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Pure grouping; flattened into the runnable list, never evaluated.
    Category { children: Vec<SplitId> },
    /// Evaluated directly: every check must hold, then every `more` leaf.
    Leaf {
        checks: Vec<Check>,
        more: Vec<SplitId>,
        next: Vec<SplitId>,
    },
}

#[derive(Debug, Clone)]
pub struct SplitNode {
    pub name: String,
    pub description: String,
    pub tooltip: String,
    pub active: bool,
    pub repeat: u32,
    pub parent: Option<SplitId>,
    pub kind: NodeKind,
}

impl SplitNode {
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct SplitArena {
    nodes: Vec<SplitNode>,
}

impl SplitArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Panics on an id from another arena.
    pub fn get(&self, id: SplitId) -> &SplitNode {
        &self.nodes[id.0]
    }

    pub fn checks(&self, id: SplitId) -> &[Check] {
        match &self.get(id).kind {
            NodeKind::Leaf { checks, .. } => checks,
            NodeKind::Category { .. } => &[],
        }
    }

    pub fn more(&self, id: SplitId) -> &[SplitId] {
        match &self.get(id).kind {
            NodeKind::Leaf { more, .. } => more,
            NodeKind::Category { .. } => &[],
        }
    }

    pub fn next(&self, id: SplitId) -> &[SplitId] {
        match &self.get(id).kind {
            NodeKind::Leaf { next, .. } => next,
            NodeKind::Category { .. } => &[],
        }
    }

    /// `Category/Sub/Leaf`, for log lines.
    pub fn path(&self, id: SplitId) -> String {
        let mut names = vec![self.get(id).name.as_str()];
        let mut cursor = self.get(id).parent;
        while let Some(parent) = cursor {
            names.push(self.get(parent).name.as_str());
            cursor = self.get(parent).parent;
        }
        names.reverse();
        names.join("/")
    }

    /// Resolves `def` and everything below it.
    pub fn insert(
        &mut self,
        def: &SplitDef,
        parent: Option<SplitId>,
    ) -> Result<SplitId, ValidationError> {
        let label = display_name(def);
        let checks = def.all_checks();

        if !def.children.is_empty() {
            if !checks.is_empty() || !def.more.is_empty() || !def.next.is_empty() {
                return Err(invalid(
                    &label,
                    "a category cannot carry checks, more or next",
                ));
            }
            let id = self.push(def, parent, NodeKind::Category { children: Vec::new() });
            let children = def
                .children
                .iter()
                .map(|child| self.insert(child, Some(id)))
                .collect::<Result<Vec<_>, _>>()?;
            self.nodes[id.0].kind = NodeKind::Category { children };
            return Ok(id);
        }

        if checks.is_empty() {
            return Err(invalid(&label, "has neither checks nor children"));
        }
        let checks = checks
            .iter()
            .map(|c| c.resolve(&label))
            .collect::<Result<Vec<_>, _>>()?;

        let id = self.push(
            def,
            parent,
            NodeKind::Leaf {
                checks,
                more: Vec::new(),
                next: Vec::new(),
            },
        );
        let more = self.insert_leaves(&def.more, id, "more")?;
        let next = self.insert_leaves(&def.next, id, "next")?;
        if let NodeKind::Leaf {
            more: m, next: n, ..
        } = &mut self.nodes[id.0].kind
        {
            *m = more;
            *n = next;
        }
        Ok(id)
    }

    fn insert_leaves(
        &mut self,
        defs: &[SplitDef],
        parent: SplitId,
        field: &str,
    ) -> Result<Vec<SplitId>, ValidationError> {
        defs.iter()
            .map(|def| {
                if !def.children.is_empty() {
                    return Err(invalid(
                        &display_name(def),
                        &format!("entries of '{}' must be leaves", field),
                    ));
                }
                self.insert(def, Some(parent))
            })
            .collect()
    }

    fn push(&mut self, def: &SplitDef, parent: Option<SplitId>, kind: NodeKind) -> SplitId {
        let id = SplitId(self.nodes.len());
        self.nodes.push(SplitNode {
            name: def.name.clone(),
            description: def.description.clone(),
            tooltip: def.tooltip.clone(),
            active: def.active,
            repeat: def.repeat,
            parent,
            kind,
        });
        id
    }

    /// Flattens `roots` into leaves in document order. Categories expand their
    /// children, every node is emitted `repeat + 1` times, and inactive or
    /// disabled nodes drop out together with their subtree.
    pub fn runnable(
        &self,
        roots: &[SplitId],
        enabled: &dyn Fn(&SplitNode) -> bool,
    ) -> RunnableList {
        let mut entries = Vec::new();
        for &root in roots {
            self.expand(root, enabled, &mut entries);
        }
        RunnableList { entries }
    }

    fn expand(&self, id: SplitId, enabled: &dyn Fn(&SplitNode) -> bool, out: &mut Vec<SplitId>) {
        let node = self.get(id);
        if !node.active || !enabled(node) {
            return;
        }
        for _ in 0..=node.repeat {
            match &node.kind {
                NodeKind::Category { children } => {
                    for &child in children {
                        self.expand(child, enabled, out);
                    }
                }
                NodeKind::Leaf { .. } => out.push(id),
            }
        }
    }
}

fn display_name(def: &SplitDef) -> String {
    if def.name.is_empty() {
        "<unnamed>".to_string()
    } else {
        def.name.clone()
    }
}

fn invalid(split: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidSplit {
        split: split.to_string(),
        reason: reason.to_string(),
    }
}

/// Ordered leaves eligible for evaluation during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunnableList {
    entries: Vec<SplitId>,
}

impl RunnableList {
    pub fn get(&self, index: usize) -> Option<SplitId> {
        self.entries.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = SplitId> + '_ {
        self.entries.iter().copied()
    }
}

/// # Compiled Game
///
/// A validated game with its condition tree resolved into an arena.
#[derive(Debug, Clone)]
pub struct Game {
    pub name: String,
    pub settings: GameSettings,
    pub arena: SplitArena,
    pub roots: Vec<SplitId>,
    pub autostart: Option<SplitId>,
    /// Converted from the categories/definitions layout: each root is one run
    /// category and only one of them is runnable at a time.
    pub legacy: bool,
}

impl Game {
    /// Resolves a current-format definition. Legacy files are converted first.
    pub fn compile(def: &GameDef) -> Result<Self, ValidationError> {
        if def.splits.is_empty() {
            return Err(ValidationError::EmptyConfiguration);
        }

        let mut arena = SplitArena::new();
        let roots = def
            .splits
            .iter()
            .map(|split| arena.insert(split, None))
            .collect::<Result<Vec<_>, _>>()?;

        let autostart = match &def.autostart {
            Some(AutostartDef::Inline(split)) => {
                let id = arena.insert(split, None)?;
                if !arena.get(id).is_leaf() {
                    return Err(invalid(&display_name(split), "autostart must be a leaf"));
                }
                Some(id)
            }
            Some(AutostartDef::Name(name)) if !name.is_empty() => {
                return Err(ValidationError::MissingDefinition {
                    name: name.clone(),
                    referenced_by: "autostart".to_string(),
                })
            }
            _ => None,
        };

        Ok(Self {
            name: def.name.clone(),
            settings: def.settings,
            arena,
            roots,
            autostart,
            legacy: false,
        })
    }

    /// Runnable list for the run category `category`. A legacy game uses the
    /// root matching `category` case-insensitively, or its first root.
    pub fn runnable(
        &self,
        category: Option<&str>,
        enabled: &dyn Fn(&SplitNode) -> bool,
    ) -> RunnableList {
        if !self.legacy {
            return self.arena.runnable(&self.roots, enabled);
        }

        let chosen = category
            .and_then(|wanted| {
                self.roots
                    .iter()
                    .copied()
                    .find(|&id| self.arena.get(id).name.eq_ignore_ascii_case(wanted))
            })
            .or_else(|| self.roots.first().copied());
        match chosen {
            Some(root) => self.arena.runnable(&[root], enabled),
            None => RunnableList::default(),
        }
    }
}
