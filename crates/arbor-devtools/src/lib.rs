use serde::Serialize;
use web_time::Instant;

use arbor_core::{BatchStats, Entry, Kind, Result, Root, Value};

/// One status line over a root's batch statistics, with a smoothed drain rate.
pub struct Hud {
    samples: u64,
    last_sample: Option<Instant>,
    last_drains: u64,
    drains_per_sec: f32,
    pub stats: Option<BatchStats>,
}

impl Default for Hud {
    fn default() -> Self {
        Self::new()
    }
}

impl Hud {
    pub fn new() -> Self {
        Self {
            samples: 0,
            last_sample: None,
            last_drains: 0,
            drains_per_sec: 0.0,
            stats: None,
        }
    }

    pub fn observe(&mut self, stats: BatchStats) {
        self.samples += 1;
        let now = Instant::now();
        if let Some(prev) = self.last_sample.replace(now) {
            let dt = (now - prev).as_secs_f32();
            if dt > 0.0 {
                let rate = stats.drains.saturating_sub(self.last_drains) as f32 / dt;
                // simple EMA
                let a = 0.2;
                self.drains_per_sec = if self.drains_per_sec == 0.0 {
                    rate
                } else {
                    (1.0 - a) * self.drains_per_sec + a * rate
                };
            }
        }
        self.last_drains = stats.drains;
        self.stats = Some(stats);
    }

    pub fn line(&self) -> String {
        let mut parts = vec![
            format!("sample: {}", self.samples),
            format!("drains/s: {:.1}", self.drains_per_sec),
        ];
        if let Some(s) = &self.stats {
            parts.push(format!("drains: {}", s.drains));
            parts.push(format!("last drain: {:.2} ms", s.last_drain_ms));
            parts.push(format!(
                "recomputed/notified/destroyed: {}/{}/{}",
                s.recomputed, s.notified, s.destroyed
            ));
            if s.failures > 0 {
                parts.push(format!("failures: {}", s.failures));
            }
        }
        parts.join("  |  ")
    }
}

/// What the inspector saw of one entry.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NodeSnapshot {
    pub path: String,
    pub depth: usize,
    pub kind: Kind,
    pub schema: &'static str,
    /// The cached value; `None` when it has not been computed.
    pub value: Option<Value>,
    pub listeners: usize,
    pub collectable: bool,
}

/// Depth-first listing of the entries instantiated under a root.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TreeSnapshot {
    pub nodes: Vec<NodeSnapshot>,
}

impl TreeSnapshot {
    /// Walks the live tree without computing anything.
    pub fn capture(entry: &Entry) -> Result<Self> {
        let mut nodes = Vec::new();
        walk(entry, 0, false, &mut nodes)?;
        Ok(Self { nodes })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn find(&self, path: &str) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|n| n.path == path)
    }

    pub fn render_lines(&self) -> Vec<String> {
        self.nodes
            .iter()
            .map(|n| {
                let value = match &n.value {
                    Some(v) => v.to_string(),
                    None => "-".to_string(),
                };
                let mut line = format!(
                    "{:indent$}{} <{} {:?}> = {}",
                    "",
                    n.path,
                    n.schema,
                    n.kind,
                    value,
                    indent = n.depth * 2
                );
                if n.listeners > 0 {
                    line.push_str(&format!(" ({} listening)", n.listeners));
                }
                if n.collectable {
                    line.push_str(" [gc]");
                }
                line
            })
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn walk(entry: &Entry, depth: usize, collectable: bool, out: &mut Vec<NodeSnapshot>) -> Result<()> {
    let schema = entry.schema()?;
    out.push(NodeSnapshot {
        path: entry.path_string(),
        depth,
        kind: schema.kind(),
        schema: schema.name(),
        value: entry.peek()?,
        listeners: entry.listener_count()?,
        collectable,
    });
    for (key, child) in entry.children()? {
        walk(&child, depth + 1, schema.is_collectable(&key), out)?;
    }
    Ok(())
}

pub struct Inspector {
    pub hud: Hud,
    pub enabled: bool,
}

impl Default for Inspector {
    fn default() -> Self {
        Self::new()
    }
}

impl Inspector {
    pub fn new() -> Self {
        Self {
            hud: Hud::new(),
            enabled: false,
        }
    }

    pub fn toggle(&mut self) {
        self.enabled = !self.enabled;
    }

    /// HUD line followed by the tree listing, or nothing while disabled.
    pub fn frame(&mut self, root: &Root) -> Vec<String> {
        if !self.enabled {
            return Vec::new();
        }
        self.hud.observe(root.stats());
        let mut lines = vec![self.hud.line()];
        match TreeSnapshot::capture(root) {
            Ok(snapshot) => lines.extend(snapshot.render_lines()),
            Err(e) => {
                log::warn!("inspector could not walk the tree: {e}");
                lines.push(format!("<{e}>"));
            }
        }
        lines
    }
}
