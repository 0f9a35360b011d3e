//! Node types and their typed parameter sets.
//!
//! `NodeParams` is a tagged union keyed by `NodeType`, not a generic
//! key/value bag, so the cache key engine and the adapters can be checked
//! exhaustively. Parameter entries flatten to stable text for hashing:
//! floats go through `to_bits` so textual rounding can never split or merge
//! cache lineages.

use serde::{Deserialize, Serialize};

use super::node::NodeId;

/// Processing step families. `Video` and `Compare` are output-less: nothing
/// can connect downstream of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Source,
    Renderer,
    Modifier,
    Upscale,
    Video,
    Compare,
}

impl NodeType {
    /// Short tag used in cache keys and logs.
    pub fn tag(self) -> &'static str {
        match self {
            NodeType::Source => "source",
            NodeType::Renderer => "render",
            NodeType::Modifier => "modify",
            NodeType::Upscale => "upscale",
            NodeType::Video => "video",
            NodeType::Compare => "compare",
        }
    }

    /// Whether downstream nodes may connect to this node's output.
    pub fn has_output(self) -> bool {
        !matches!(self, NodeType::Video | NodeType::Compare)
    }

    /// Whether this node takes its input through the edge table.
    /// Source captures from the host; Compare uses its two slots.
    pub fn accepts_edge_input(self) -> bool {
        !matches!(self, NodeType::Source | NodeType::Compare)
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Paint-over mask for Modifier nodes. The pixel payload is volatile and
/// never hashed; `revision` is bumped by the host on every stroke so the
/// cache key still tracks mask edits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mask {
    pub revision: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pixels: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceParams {
    /// Display label on the canvas.
    pub label: String,
}

impl Default for SourceParams {
    fn default() -> Self {
        Self { label: "Capture".to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderParams {
    pub prompt: String,
    /// Style preset name understood by the backend.
    pub style: String,
    pub seed: i64,
    /// Aspect preset, e.g. "16:9".
    pub aspect: String,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            style: "default".to_string(),
            seed: 0,
            aspect: "16:9".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifyParams {
    pub prompt: String,
    /// Edit strength in 0.0..=1.0.
    pub strength: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<Mask>,
}

impl Default for ModifyParams {
    fn default() -> Self {
        Self { prompt: String::new(), strength: 0.75, mask: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpscaleParams {
    pub factor: f32,
    pub denoise: bool,
}

impl Default for UpscaleParams {
    fn default() -> Self {
        Self { factor: 2.0, denoise: false }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoParams {
    pub prompt: String,
    pub duration_secs: f32,
    /// Camera/subject motion amount in 0.0..=1.0.
    pub motion: f32,
}

impl Default for VideoParams {
    fn default() -> Self {
        Self { prompt: String::new(), duration_secs: 4.0, motion: 0.5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CompareMode {
    #[default]
    SideBySide,
    Wipe,
}

/// Which Compare slot an assignment targets ("use as A" / "use as B").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareSlot {
    A,
    B,
}

/// Compare is the two-input exception to the single-slot edge model: its
/// inputs are assigned out-of-band and stored here, so snapshots,
/// persistence and the cache key capture them without extra plumbing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompareParams {
    pub mode: CompareMode,
    pub input_a: Option<NodeId>,
    pub input_b: Option<NodeId>,
}

/// Per-type parameter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeParams {
    Source(SourceParams),
    Render(RenderParams),
    Modify(ModifyParams),
    Upscale(UpscaleParams),
    Video(VideoParams),
    Compare(CompareParams),
}

impl NodeParams {
    /// Default parameter set for a freshly added node of `kind`.
    pub fn defaults_for(kind: NodeType) -> Self {
        match kind {
            NodeType::Source => NodeParams::Source(SourceParams::default()),
            NodeType::Renderer => NodeParams::Render(RenderParams::default()),
            NodeType::Modifier => NodeParams::Modify(ModifyParams::default()),
            NodeType::Upscale => NodeParams::Upscale(UpscaleParams::default()),
            NodeType::Video => NodeParams::Video(VideoParams::default()),
            NodeType::Compare => NodeParams::Compare(CompareParams::default()),
        }
    }

    pub fn kind(&self) -> NodeType {
        match self {
            NodeParams::Source(_) => NodeType::Source,
            NodeParams::Render(_) => NodeType::Renderer,
            NodeParams::Modify(_) => NodeType::Modifier,
            NodeParams::Upscale(_) => NodeType::Upscale,
            NodeParams::Video(_) => NodeType::Video,
            NodeParams::Compare(_) => NodeType::Compare,
        }
    }

    pub fn as_compare(&self) -> Option<&CompareParams> {
        match self {
            NodeParams::Compare(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_compare_mut(&mut self) -> Option<&mut CompareParams> {
        match self {
            NodeParams::Compare(p) => Some(p),
            _ => None,
        }
    }

    /// Flatten to sorted `key=value` text entries for hashing.
    /// Volatile fields (mask pixels) are excluded; a mask participates only
    /// through its revision counter.
    pub fn hash_entries(&self) -> Vec<(&'static str, String)> {
        let mut entries = match self {
            NodeParams::Source(p) => vec![("label", p.label.clone())],
            NodeParams::Render(p) => vec![
                ("aspect", p.aspect.clone()),
                ("prompt", p.prompt.clone()),
                ("seed", p.seed.to_string()),
                ("style", p.style.clone()),
            ],
            NodeParams::Modify(p) => vec![
                ("mask_rev", match &p.mask {
                    Some(m) => m.revision.to_string(),
                    None => "none".to_string(),
                }),
                ("prompt", p.prompt.clone()),
                ("strength", float_bits(p.strength)),
            ],
            NodeParams::Upscale(p) => vec![
                ("denoise", p.denoise.to_string()),
                ("factor", float_bits(p.factor)),
            ],
            NodeParams::Video(p) => vec![
                ("duration", float_bits(p.duration_secs)),
                ("motion", float_bits(p.motion)),
                ("prompt", p.prompt.clone()),
            ],
            NodeParams::Compare(p) => vec![
                ("input_a", id_text(p.input_a)),
                ("input_b", id_text(p.input_b)),
                ("mode", format!("{:?}", p.mode)),
            ],
        };
        entries.sort_unstable_by_key(|(k, _)| *k);
        entries
    }

    /// Copy for `duplicate_node`: structural values only. Mask pixel
    /// payloads stay behind; the revision is kept so the copy hashes the
    /// same as its origin.
    pub fn structural_clone(&self) -> Self {
        let mut copy = self.clone();
        if let NodeParams::Modify(p) = &mut copy {
            if let Some(mask) = &mut p.mask {
                mask.pixels.clear();
            }
        }
        copy
    }
}

fn float_bits(v: f32) -> String {
    format!("{:08x}", v.to_bits())
}

fn id_text(id: Option<NodeId>) -> String {
    match id {
        Some(id) => id.to_string(),
        None => "none".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_kind() {
        for kind in [
            NodeType::Source,
            NodeType::Renderer,
            NodeType::Modifier,
            NodeType::Upscale,
            NodeType::Video,
            NodeType::Compare,
        ] {
            assert_eq!(NodeParams::defaults_for(kind).kind(), kind);
        }
    }

    #[test]
    fn test_output_less_types() {
        assert!(!NodeType::Video.has_output());
        assert!(!NodeType::Compare.has_output());
        assert!(NodeType::Source.has_output());
        assert!(NodeType::Upscale.has_output());
        assert!(!NodeType::Source.accepts_edge_input());
        assert!(!NodeType::Compare.accepts_edge_input());
        assert!(NodeType::Modifier.accepts_edge_input());
    }

    #[test]
    fn test_hash_entries_sorted_and_stable() {
        let p = NodeParams::Render(RenderParams {
            prompt: "castle at dusk".into(),
            style: "oil".into(),
            seed: 42,
            aspect: "1:1".into(),
        });
        let entries = p.hash_entries();
        let keys: Vec<_> = entries.iter().map(|(k, _)| *k).collect();
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        assert_eq!(keys, sorted);
        assert_eq!(entries, p.hash_entries());
    }

    #[test]
    fn test_mask_pixels_do_not_hash() {
        let mut a = ModifyParams { prompt: "sky".into(), strength: 0.5, mask: None };
        a.mask = Some(Mask { revision: 3, pixels: vec![1, 2, 3] });
        let mut b = a.clone();
        b.mask = Some(Mask { revision: 3, pixels: vec![9, 9, 9, 9] });
        assert_eq!(
            NodeParams::Modify(a.clone()).hash_entries(),
            NodeParams::Modify(b).hash_entries()
        );

        // Bumping the revision does change the entries.
        let mut c = a.clone();
        c.mask = Some(Mask { revision: 4, pixels: vec![] });
        assert_ne!(
            NodeParams::Modify(a).hash_entries(),
            NodeParams::Modify(c).hash_entries()
        );
    }

    #[test]
    fn test_structural_clone_drops_mask_pixels() {
        let p = NodeParams::Modify(ModifyParams {
            prompt: "tree".into(),
            strength: 1.0,
            mask: Some(Mask { revision: 7, pixels: vec![0xff; 64] }),
        });
        let copy = p.structural_clone();
        match &copy {
            NodeParams::Modify(m) => {
                let mask = m.mask.as_ref().unwrap();
                assert_eq!(mask.revision, 7);
                assert!(mask.pixels.is_empty());
            }
            _ => panic!("wrong variant"),
        }
        // Same cache lineage as the original.
        assert_eq!(p.hash_entries(), copy.hash_entries());
    }
}
