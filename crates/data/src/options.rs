use crate::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Where the first level of the chart faces
///
/// Layout is always computed in the top-down frame; the orientation is
/// applied to the finished coordinates as a rigid transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Top,
    Bottom,
    Right,
    Left,
    TopLeft,
    BottomLeft,
    RightTop,
    LeftTop,
}

impl Orientation {
    /// Whether levels grow along the horizontal axis after the transform
    pub fn is_horizontal(self) -> bool {
        matches!(
            self,
            Orientation::Left | Orientation::Right | Orientation::RightTop | Orientation::LeftTop
        )
    }

    /// Whether parents are edge-aligned over their children instead of
    /// centered
    pub fn is_offset(self) -> bool {
        matches!(
            self,
            Orientation::TopLeft
                | Orientation::BottomLeft
                | Orientation::RightTop
                | Orientation::LeftTop
        )
    }
}

/// Placement algorithm for children within a sub tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LayoutKind {
    #[default]
    Normal,
    Mixed,
    Tree,
    TreeLeftOffset,
    TreeRightOffset,
    TreeLeft,
    TreeRight,
}

/// Which container dimension the initial scale fits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    Height,
    Width,
    Boundary,
}

/// Initial scale, either a fixed factor or fit-to-container
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScaleInitial {
    Factor(f64),
    Fit(FitMode),
}

impl Default for ScaleInitial {
    fn default() -> Self {
        ScaleInitial::Factor(1.0)
    }
}

/// Easing curve name, carried through to the transition plan untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Easing {
    InPow,
    #[default]
    OutPow,
    InOutPow,
    InSin,
    OutSin,
    InOutSin,
    InExp,
    OutExp,
    InOutExp,
    InCirc,
    OutCirc,
    InOutCirc,
    InBack,
    OutBack,
    InOutBack,
    Impulse,
    ExpPulse,
}

/// Animation metadata attached to transition plans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnimOptions {
    pub func: Easing,
    pub duration: u64,
}

impl Default for AnimOptions {
    fn default() -> Self {
        Self {
            func: Easing::OutPow,
            duration: 200,
        }
    }
}

/// Initial collapse directive
///
/// Collapses every node on `level`; with `all_children` set, deeper levels
/// collapse as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CollapseDirective {
    pub level: u32,
    pub all_children: bool,
}

/// Initial expand directive, applied after collapse directives
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExpandDirective {
    pub nodes: Vec<NodeId>,
    pub all_children: bool,
}

/// Sort key for roots and siblings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderKey {
    pub field: String,
    #[serde(default)]
    pub desc: bool,
}

impl From<&str> for OrderKey {
    fn from(field: &str) -> Self {
        Self {
            field: field.to_string(),
            desc: false,
        }
    }
}

/// A non-structural link drawn between two nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSpec {
    pub from: NodeId,
    pub to: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

/// Node bounding boxes by template name
///
/// `size` is the full box as `[width, height]`, `min_size` the box of a
/// minimized node, `padding` the inset reserved around hosted sub trees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub size: [f64; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding: Option<f64>,
}

impl Template {
    /// The built-in template every chart starts from
    pub fn base() -> Self {
        Self {
            size: [250.0, 120.0],
            min_size: Some([250.0, 60.0]),
            padding: Some(30.0),
        }
    }

    /// Size of a minimized node, falling back to half height
    pub fn min_size(&self) -> [f64; 2] {
        self.min_size
            .unwrap_or([self.size[0], (self.size[1] / 2.0).max(1.0)])
    }
}

/// Overrides applied to the sub trees rooted at tagged nodes
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubtreeOptions {
    pub orientation: Option<Orientation>,
    pub layout: Option<LayoutKind>,
    pub columns: Option<usize>,
    pub level_separation: Option<f64>,
    pub sibling_separation: Option<f64>,
    pub subtree_separation: Option<f64>,
    pub mixed_hierarchy_nodes_separation: Option<f64>,
    pub collapse: Option<CollapseDirective>,
}

/// Per-tag configuration
///
/// A tag can swap the template of tagged nodes, mark them as assistants,
/// pin their collapse state, push them down extra levels, or configure the
/// sub trees they host.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TagOptions {
    pub template: Option<String>,
    /// Tagged nodes join their parent's assistant band
    pub assistant: bool,
    /// Pins the initial collapse state of tagged nodes, overriding the
    /// level directive either way
    pub collapsed: Option<bool>,
    pub sub_levels: Option<u32>,
    #[serde(rename = "subTreeConfig")]
    pub subtree: Option<SubtreeOptions>,
}

/// Chart configuration, fixed for the lifetime of an engine
///
/// Field names and defaults follow the original dataset format, so a
/// serialized options object from an existing chart loads unchanged.
/// Partial objects are fine, anything missing falls back to the default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
    pub orientation: Orientation,
    pub layout: LayoutKind,

    /// Distance between two levels
    pub level_separation: f64,
    /// Distance between adjacent leaf nodes of the same parent
    pub sibling_separation: f64,
    /// Distance between adjacent sub trees and between root trees in the
    /// grid
    pub subtree_separation: f64,
    /// Vertical gap between stacked children in the mixed layout
    pub mixed_hierarchy_nodes_separation: f64,
    /// Children counts above this stack vertically in the mixed layout
    pub mixed_layout_threshold: usize,
    /// Distance between a parent and its assistant band
    pub assistant_separation: f64,
    /// Minimum span a partnered node group reserves beyond its base
    pub min_partner_separation: f64,
    /// Gap between the child groups of different partners of one base
    pub partner_children_split_separation: f64,
    /// Gap between a node and its adjacent partner
    pub partner_node_separation: f64,
    /// Grid width when the chart has several roots
    pub columns: usize,
    /// Inset reserved inside nodes hosting sub trees
    pub padding: f64,

    #[serde(deserialize_with = "deserialize_order_by")]
    pub order_by: Vec<OrderKey>,
    /// Explicit root selection and ordering; the default is every node
    /// without a parent, in input order
    pub roots: Option<Vec<NodeId>>,
    pub collapse: Option<CollapseDirective>,
    pub expand: Option<ExpandDirective>,
    /// Start with every node minimized
    pub min: bool,

    /// Template applied to untagged nodes
    pub template: String,
    pub templates: HashMap<String, Template>,
    pub tags: HashMap<String, TagOptions>,

    pub scale_initial: ScaleInitial,
    pub scale_min: f64,
    pub scale_max: f64,
    pub anim: AnimOptions,

    /// Record fields the search index covers
    pub search_fields: Vec<String>,
    /// Field shown as the result caption, defaults to the first search
    /// field
    pub search_display_field: Option<String>,
    /// Per-field weight in percent, 100 when absent
    pub search_fields_weight: HashMap<String, f64>,
    /// Shorthand prefixes accepted in `abbr:term` queries
    pub search_fields_abbreviation: HashMap<String, String>,
    /// Result cap, 0 disables the cap
    pub search_result_limit: usize,

    pub clinks: Vec<LinkSpec>,
    pub slinks: Vec<LinkSpec>,
    pub dotted_lines: Vec<LinkSpec>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            orientation: Orientation::Top,
            layout: LayoutKind::Normal,
            level_separation: 60.0,
            sibling_separation: 20.0,
            subtree_separation: 40.0,
            mixed_hierarchy_nodes_separation: 20.0,
            mixed_layout_threshold: 5,
            assistant_separation: 100.0,
            min_partner_separation: 50.0,
            partner_children_split_separation: 20.0,
            partner_node_separation: 15.0,
            columns: 10,
            padding: 30.0,
            order_by: Vec::new(),
            roots: None,
            collapse: None,
            expand: None,
            min: false,
            template: "base".to_string(),
            templates: HashMap::from([("base".to_string(), Template::base())]),
            tags: HashMap::new(),
            scale_initial: ScaleInitial::default(),
            scale_min: 0.1,
            scale_max: 5.0,
            anim: AnimOptions::default(),
            search_fields: vec!["name".to_string()],
            search_display_field: None,
            search_fields_weight: HashMap::new(),
            search_fields_abbreviation: HashMap::new(),
            search_result_limit: 10,
            clinks: Vec::new(),
            slinks: Vec::new(),
            dotted_lines: Vec::new(),
        }
    }
}

impl Options {
    /// Check the configuration for values the layout cannot work with
    ///
    /// # Errors
    /// Returns the first offending value found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let separations = [
            ("levelSeparation", self.level_separation),
            ("siblingSeparation", self.sibling_separation),
            ("subtreeSeparation", self.subtree_separation),
            (
                "mixedHierarchyNodesSeparation",
                self.mixed_hierarchy_nodes_separation,
            ),
            ("assistantSeparation", self.assistant_separation),
            ("minPartnerSeparation", self.min_partner_separation),
            (
                "partnerChildrenSplitSeparation",
                self.partner_children_split_separation,
            ),
            ("partnerNodeSeparation", self.partner_node_separation),
            ("padding", self.padding),
        ];
        for (name, value) in separations {
            if value < 0.0 || !value.is_finite() {
                return Err(ConfigError::NegativeSeparation { name, value });
            }
        }
        if self.columns == 0 {
            return Err(ConfigError::ZeroColumns);
        }
        if self.scale_min <= 0.0 || self.scale_min >= self.scale_max {
            return Err(ConfigError::ScaleRange {
                min: self.scale_min,
                max: self.scale_max,
            });
        }
        if !self.templates.contains_key(&self.template) {
            return Err(ConfigError::UnknownDefaultTemplate(self.template.clone()));
        }
        for (tag, config) in &self.tags {
            if let Some(template) = &config.template {
                if !self.templates.contains_key(template) {
                    return Err(ConfigError::UnknownTemplate {
                        tag: tag.clone(),
                        template: template.clone(),
                    });
                }
            }
        }
        for (abbreviation, field) in &self.search_fields_abbreviation {
            if !self.search_fields.contains(field) {
                return Err(ConfigError::UnknownSearchField {
                    abbreviation: abbreviation.clone(),
                    field: field.clone(),
                });
            }
        }
        Ok(())
    }

    /// Template applied to a node with the given tags
    ///
    /// The last tag carrying a template override wins; untagged nodes use
    /// the chart template.
    pub fn template_for(&self, tags: &[String]) -> &Template {
        let name = tags
            .iter()
            .rev()
            .find_map(|tag| self.tags.get(tag).and_then(|t| t.template.as_deref()))
            .unwrap_or(&self.template);
        static BASE: Template = Template {
            size: [250.0, 120.0],
            min_size: Some([250.0, 60.0]),
            padding: Some(30.0),
        };
        self.templates.get(name).unwrap_or(&BASE)
    }

    /// Extra levels a node with the given tags is pushed down
    pub fn sub_levels_for(&self, tags: &[String]) -> u32 {
        tags.iter()
            .filter_map(|tag| self.tags.get(tag).and_then(|t| t.sub_levels))
            .max()
            .unwrap_or(0)
    }

    /// Sub tree overrides attached to the given tags, if any
    pub fn subtree_config_for(&self, tags: &[String]) -> Option<&SubtreeOptions> {
        tags.iter()
            .rev()
            .find_map(|tag| self.tags.get(tag).and_then(|t| t.subtree.as_ref()))
    }

    /// Whether a node with the given tags belongs on the assistant band
    ///
    /// The literal `assistant` tag always counts, other tags only when
    /// their configuration says so.
    pub fn is_assistant(&self, tags: &[String]) -> bool {
        tags.iter().any(|tag| {
            tag == crate::ASSISTANT_TAG || self.tags.get(tag).is_some_and(|t| t.assistant)
        })
    }

    /// Every tag that marks nodes as assistants
    pub fn assistant_tags(&self) -> Vec<String> {
        let mut found = vec![crate::ASSISTANT_TAG.to_string()];
        found.extend(
            self.tags
                .iter()
                .filter(|(_, t)| t.assistant)
                .map(|(tag, _)| tag.clone()),
        );
        found
    }

    /// Pinned initial collapse state for the given tags
    ///
    /// The last tag carrying an override wins.
    pub fn collapsed_override_for(&self, tags: &[String]) -> Option<bool> {
        tags.iter()
            .rev()
            .find_map(|tag| self.tags.get(tag).and_then(|t| t.collapsed))
    }

    /// Field shown as the caption of search results
    pub fn display_field(&self) -> Option<&str> {
        self.search_display_field
            .as_deref()
            .or_else(|| self.search_fields.first().map(String::as_str))
    }

    /// Weight of a search field in percent
    pub fn search_weight(&self, field: &str) -> f64 {
        self.search_fields_weight.get(field).copied().unwrap_or(100.0)
    }
}

/// `orderBy` takes a bare field name, one key object, or a list of either;
/// everything normalizes to a list of [`OrderKey`]s
fn deserialize_order_by<'de, D>(deserializer: D) -> Result<Vec<OrderKey>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum KeySpec {
        Field(String),
        Key(OrderKey),
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(KeySpec),
        Many(Vec<KeySpec>),
    }

    let keys = match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(key) => vec![key],
        OneOrMany::Many(keys) => keys,
    };
    Ok(keys
        .into_iter()
        .map(|key| match key {
            KeySpec::Field(field) => OrderKey { field, desc: false },
            KeySpec::Key(key) => key,
        })
        .collect())
}

/// Configuration rejected by [`Options::validate`]
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must not be negative, got {value}")]
    NegativeSeparation { name: &'static str, value: f64 },
    #[error("columns must be at least 1")]
    ZeroColumns,
    #[error("scale range is invalid: min {min}, max {max}")]
    ScaleRange { min: f64, max: f64 },
    #[error("the default template {0:?} is not defined")]
    UnknownDefaultTemplate(String),
    #[error("tag {tag:?} references the undefined template {template:?}")]
    UnknownTemplate { tag: String, template: String },
    #[error("search abbreviation {abbreviation:?} targets {field:?} which is not a search field")]
    UnknownSearchField { abbreviation: String, field: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn partial_json_keeps_defaults() {
        let options: Options =
            serde_json::from_str(r#"{"orientation": "left", "siblingSeparation": 35}"#).unwrap();
        assert_eq!(options.orientation, Orientation::Left);
        assert_eq!(options.sibling_separation, 35.0);
        assert_eq!(options.level_separation, 60.0);
        assert_eq!(options.columns, 10);
        assert_eq!(options.scale_max, 5.0);
    }

    #[test]
    fn rejects_unknown_orientation() {
        let result = serde_json::from_str::<Options>(r#"{"orientation": "diagonal"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn order_by_accepts_field_name_object_or_list() {
        let options: Options = serde_json::from_str(r#"{"orderBy": "orderId"}"#).unwrap();
        assert_eq!(options.order_by, vec![OrderKey::from("orderId")]);

        let options: Options =
            serde_json::from_str(r#"{"orderBy": {"field": "born", "desc": true}}"#).unwrap();
        assert_eq!(
            options.order_by,
            vec![OrderKey {
                field: "born".to_string(),
                desc: true
            }]
        );

        let options: Options =
            serde_json::from_str(r#"{"orderBy": ["born", {"field": "name"}]}"#).unwrap();
        assert_eq!(options.order_by.len(), 2);
        assert_eq!(options.order_by[0], OrderKey::from("born"));
        assert!(!options.order_by[1].desc);
    }

    #[test]
    fn scale_initial_accepts_number_or_fit() {
        let options: Options = serde_json::from_str(r#"{"scaleInitial": 0.5}"#).unwrap();
        assert_eq!(options.scale_initial, ScaleInitial::Factor(0.5));
        let options: Options = serde_json::from_str(r#"{"scaleInitial": "boundary"}"#).unwrap();
        assert_eq!(options.scale_initial, ScaleInitial::Fit(FitMode::Boundary));
    }

    #[test]
    fn validate_rejects_negative_separation() {
        let options = Options {
            sibling_separation: -1.0,
            ..Default::default()
        };
        assert_eq!(
            options.validate(),
            Err(ConfigError::NegativeSeparation {
                name: "siblingSeparation",
                value: -1.0
            })
        );
    }

    #[test]
    fn validate_rejects_dangling_template_reference() {
        let options = Options {
            tags: HashMap::from([(
                "lead".to_string(),
                TagOptions {
                    template: Some("gilded".to_string()),
                    ..Default::default()
                },
            )]),
            ..Default::default()
        };
        assert!(matches!(
            options.validate(),
            Err(ConfigError::UnknownTemplate { .. })
        ));
    }

    #[test]
    fn validate_rejects_abbreviation_for_unindexed_field() {
        let options = Options {
            search_fields_abbreviation: HashMap::from([(
                "tl".to_string(),
                "title".to_string(),
            )]),
            ..Default::default()
        };
        assert!(matches!(
            options.validate(),
            Err(ConfigError::UnknownSearchField { .. })
        ));
    }

    #[test]
    fn tag_template_override_wins_over_chart_template() {
        let mut options = Options::default();
        options.templates.insert(
            "wide".to_string(),
            Template {
                size: [400.0, 120.0],
                min_size: None,
                padding: None,
            },
        );
        options.tags.insert(
            "director".to_string(),
            TagOptions {
                template: Some("wide".to_string()),
                ..Default::default()
            },
        );
        let tags = vec!["director".to_string()];
        assert_eq!(options.template_for(&tags).size, [400.0, 120.0]);
        assert_eq!(options.template_for(&[]).size, [250.0, 120.0]);
    }
}
