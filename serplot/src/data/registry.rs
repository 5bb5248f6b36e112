use super::sample::ChannelId;
use crate::config::ChannelDecl;
use ratatui::style::Color;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    #[default]
    Numeric,
    Text,
}

/// Colors handed out to auto-created channels, in creation order.
pub const PALETTE: [Color; 8] = [
    Color::Cyan,
    Color::Yellow,
    Color::Magenta,
    Color::Green,
    Color::LightRed,
    Color::LightBlue,
    Color::White,
    Color::LightGreen,
];

#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub display_name: String,
    pub unit: Option<String>,
    pub color: Color,
    /// Initial visibility. The view may override it.
    pub visible: bool,
    pub kind: ChannelKind,
}

impl Channel {
    fn auto(id: ChannelId, name: &str) -> Channel {
        Channel {
            id,
            name: name.to_string(),
            display_name: name.to_string(),
            unit: None,
            color: PALETTE[id.index() % PALETTE.len()],
            visible: true,
            kind: ChannelKind::Numeric,
        }
    }

    fn declared(id: ChannelId, decl: &ChannelDecl) -> Channel {
        Channel {
            id,
            name: decl.name.clone(),
            display_name: decl.display_name.clone().unwrap_or_else(|| decl.name.clone()),
            unit: decl.unit.clone(),
            color: decl
                .parsed_color()
                .unwrap_or(PALETTE[id.index() % PALETTE.len()]),
            visible: decl.visible,
            kind: decl.kind,
        }
    }

    /// Display name with the unit appended, e.g. `temp [°C]`.
    pub fn label(&self) -> String {
        match &self.unit {
            Some(unit) => format!("{} [{}]", self.display_name, unit),
            None => self.display_name.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    channels: Vec<Channel>,
    by_name: HashMap<String, ChannelId>,
}

/// Maps field names to channels. Channels are only ever added, and ids are
/// assigned in creation order, so the same sequence of names always yields
/// the same ids and colors.
#[derive(Debug)]
pub struct ChannelRegistry {
    inner: RwLock<Inner>,
}

impl ChannelRegistry {
    /// Builds a registry with the declared channels registered up front, in
    /// declaration order.
    pub fn new(declarations: &[ChannelDecl]) -> ChannelRegistry {
        let mut inner = Inner::default();
        for decl in declarations {
            if inner.by_name.contains_key(&decl.name) {
                continue;
            }
            let id = ChannelId(inner.channels.len() as u32);
            inner.channels.push(Channel::declared(id, decl));
            inner.by_name.insert(decl.name.clone(), id);
        }
        ChannelRegistry {
            inner: RwLock::new(inner),
        }
    }

    pub fn resolve(&self, name: &str) -> ChannelId {
        if let Some(id) = self.lookup(name) {
            return id;
        }
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        // Another writer may have created it between the two locks.
        if let Some(id) = inner.by_name.get(name) {
            return *id;
        }
        let id = ChannelId(inner.channels.len() as u32);
        tracing::debug!("new channel {} {:?}", id, name);
        inner.channels.push(Channel::auto(id, name));
        inner.by_name.insert(name.to_string(), id);
        id
    }

    pub fn lookup(&self, name: &str) -> Option<ChannelId> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.by_name.get(name).copied()
    }

    pub fn get(&self, id: ChannelId) -> Option<Channel> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.channels.get(id.index()).cloned()
    }

    /// Consistent copy of every channel, ordered by id.
    pub fn channels(&self) -> Vec<Channel> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.channels.clone()
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
