//! Structural pattern matching over a submitted node/link graph.
//!
//! Rules are checked independently: every node that satisfies a node rule's
//! matcher counts toward that rule, and a link rule counts every submitted link
//! whose resolved endpoints satisfy its matcher pair. No optimal assignment of
//! nodes to rules is attempted.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::core::expr::{self, Limits};
use crate::core::json::is_truthy;
use crate::core::types::OneOrMany;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A component placed on the canvas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchNode {
    pub id: String,
    #[serde(default, rename = "type")]
    pub node_type: String,
    #[serde(default, alias = "paletteId")]
    pub palette_id: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Free-text configuration typed by the learner.
    #[serde(default)]
    pub config: String,
    /// Command lines; derived from `config` when empty.
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl ArchNode {
    /// Type used for counting: the declared type, else the palette id.
    pub fn kind(&self) -> &str {
        if self.node_type.is_empty() {
            &self.palette_id
        } else {
            &self.node_type
        }
    }

    /// Non-empty, non-comment command lines, trimmed.
    pub fn command_lines(&self) -> Vec<String> {
        let lines: Vec<&str> = if self.commands.is_empty() {
            self.config.lines().collect()
        } else {
            self.commands.iter().map(String::as_str).collect()
        };
        lines
            .into_iter()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
            .map(str::to_string)
            .collect()
    }

    fn display_name(&self) -> &str {
        [self.label.as_str(), self.kind(), self.id.as_str()]
            .into_iter()
            .find(|name| !name.is_empty())
            .unwrap_or("component")
    }
}

/// A connection between two nodes, with echoed endpoint metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchLink {
    #[serde(alias = "source")]
    pub from: String,
    #[serde(alias = "target")]
    pub to: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub from_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub to_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub from_label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub to_label: String,
}

/// The graph a learner submits on an architecture step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchitecturePayload {
    #[serde(default)]
    pub nodes: Vec<ArchNode>,
    #[serde(default)]
    pub links: Vec<ArchLink>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct TypePair {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeCommand {
    pub node: String,
    pub command: String,
}

/// Derived view of a payload used by type-level rules and expressions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TopologySummary {
    pub counts_by_type: BTreeMap<String, usize>,
    pub counts_by_palette: BTreeMap<String, usize>,
    pub type_pairs: Vec<TypePair>,
    pub commands: Vec<NodeCommand>,
}

/// One option offered in the component palette.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaletteEntry {
    pub id: String,
    #[serde(default, rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default, alias = "distractor")]
    pub decoy: bool,
}

/// Node matcher: a bare string, an OR-list, or an AND of field conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeMatcher {
    Text(String),
    Any(Vec<NodeMatcher>),
    Fields(Box<NodeFields>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeFields {
    pub id: Option<String>,
    pub alias: Option<String>,
    #[serde(rename = "type")]
    pub node_type: Option<String>,
    #[serde(alias = "palette_id")]
    pub palette: Option<String>,
    pub label: Option<String>,
    pub icon: Option<String>,
    pub config: Option<String>,
    pub config_contains: OneOrMany<String>,
    pub config_regex: Option<String>,
    pub commands: OneOrMany<String>,
    pub tags: OneOrMany<String>,
    pub not: Option<Box<NodeMatcher>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRule {
    #[serde(rename = "match")]
    pub matcher: NodeMatcher,
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub min: Option<usize>,
    #[serde(default)]
    pub max: Option<usize>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRule {
    pub from: NodeMatcher,
    pub to: NodeMatcher,
    #[serde(default)]
    pub bidirectional: bool,
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub min: Option<usize>,
    #[serde(default)]
    pub max: Option<usize>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Connection rule over node types only, ignoring node identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeLinkRule {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub bidirectional: bool,
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub min: Option<usize>,
    #[serde(default)]
    pub max: Option<usize>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyExpression {
    pub expr: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Expected shape of the submitted graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpectedWorld {
    pub nodes: Vec<NodeRule>,
    pub links: Vec<LinkRule>,
    #[serde(alias = "type_links")]
    pub connections: Vec<TypeLinkRule>,
    pub expressions: Vec<TopologyExpression>,
    /// When false, the node rules are exhaustive.
    pub allow_extra_nodes: bool,
}

impl Default for ExpectedWorld {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            links: Vec::new(),
            connections: Vec::new(),
            expressions: Vec::new(),
            allow_extra_nodes: true,
        }
    }
}

/// Does `node` satisfy `matcher`?
pub fn match_node(node: &ArchNode, matcher: &NodeMatcher) -> bool {
    match matcher {
        NodeMatcher::Text(text) => [
            node.node_type.as_str(),
            node.label.as_str(),
            node.palette_id.as_str(),
            node.alias.as_str(),
        ]
        .into_iter()
        .any(|field| !field.is_empty() && field == text),
        NodeMatcher::Any(options) => options.iter().any(|option| match_node(node, option)),
        NodeMatcher::Fields(fields) => match_fields(node, fields),
    }
}

fn match_fields(node: &ArchNode, fields: &NodeFields) -> bool {
    let equals = |expected: &Option<String>, actual: &str| {
        expected.as_deref().is_none_or(|expected| expected == actual)
    };
    if !(equals(&fields.id, &node.id)
        && equals(&fields.alias, &node.alias)
        && equals(&fields.node_type, node.kind())
        && equals(&fields.palette, &node.palette_id)
        && equals(&fields.label, &node.label)
        && equals(&fields.icon, &node.icon))
    {
        return false;
    }
    if let Some(config) = &fields.config
        && config.trim() != node.config.trim()
    {
        return false;
    }
    let config_lower = node.config.to_lowercase();
    if !fields
        .config_contains
        .as_slice()
        .iter()
        .all(|needle| config_lower.contains(&needle.to_lowercase()))
    {
        return false;
    }
    if let Some(pattern) = &fields.config_regex {
        match Regex::new(pattern) {
            Ok(re) if re.is_match(&node.config) => {}
            Ok(_) => return false,
            Err(err) => {
                debug!(pattern = %pattern, error = %err, "invalid config_regex never matches");
                return false;
            }
        }
    }
    if !fields.commands.as_slice().is_empty() {
        let lines = node.command_lines();
        if !fields
            .commands
            .as_slice()
            .iter()
            .all(|wanted| lines.iter().any(|line| line == wanted.trim()))
        {
            return false;
        }
    }
    if !fields
        .tags
        .as_slice()
        .iter()
        .all(|tag| node.tags.contains(tag))
    {
        return false;
    }
    fields
        .not
        .as_deref()
        .is_none_or(|negated| !match_node(node, negated))
}

/// Human description of a matcher for learner-facing messages.
pub fn describe(matcher: &NodeMatcher) -> String {
    match matcher {
        NodeMatcher::Text(text) => text.clone(),
        NodeMatcher::Any(options) => options.iter().map(describe).collect::<Vec<_>>().join(" or "),
        NodeMatcher::Fields(fields) => [
            &fields.label,
            &fields.node_type,
            &fields.palette,
            &fields.id,
            &fields.alias,
            &fields.icon,
        ]
        .into_iter()
        .flatten()
        .next()
        .cloned()
        .unwrap_or_else(|| "the described component".to_string()),
    }
}

/// Compute counts by type/palette, type pairs and flattened node commands.
pub fn summarize(payload: &ArchitecturePayload) -> TopologySummary {
    let mut summary = TopologySummary::default();
    for node in &payload.nodes {
        if !node.kind().is_empty() {
            *summary
                .counts_by_type
                .entry(node.kind().to_string())
                .or_default() += 1;
        }
        if !node.palette_id.is_empty() {
            *summary
                .counts_by_palette
                .entry(node.palette_id.clone())
                .or_default() += 1;
        }
        for command in node.command_lines() {
            summary.commands.push(NodeCommand {
                node: node.id.clone(),
                command,
            });
        }
    }
    let pairs: BTreeSet<TypePair> = payload
        .links
        .iter()
        .map(|link| {
            let (from, to) = endpoints(&payload.nodes, link);
            TypePair {
                from: from.kind().to_string(),
                to: to.kind().to_string(),
            }
        })
        .collect();
    summary.type_pairs = pairs.into_iter().collect();
    summary
}

/// Add a decoy palette entry when none is marked; returns whether one was added.
pub fn ensure_decoy(palette: &mut Vec<PaletteEntry>) -> bool {
    const DECOYS: &[(&str, &str)] = &[
        ("fax-gateway", "Fax Gateway"),
        ("print-server", "Print Server"),
        ("tape-library", "Tape Library"),
        ("dial-up-modem", "Dial-up Modem"),
    ];
    if palette.iter().any(|entry| entry.decoy) {
        return false;
    }
    let taken = |id: &str| {
        palette
            .iter()
            .any(|entry| entry.id == id || entry.node_type == id)
    };
    let (id, label) = DECOYS
        .iter()
        .find(|(id, _)| !taken(id))
        .map(|(id, label)| (id.to_string(), label.to_string()))
        .unwrap_or_else(|| {
            let id = format!("decoy-{}", palette.len());
            (id.clone(), id)
        });
    debug!(decoy = %id, "synthesized decoy palette entry");
    palette.push(PaletteEntry {
        node_type: id.clone(),
        id,
        label,
        icon: String::new(),
        decoy: true,
    });
    true
}

/// Everything the topology check needs besides the rules and the graph.
pub struct TopologyEnv<'a> {
    pub palette: &'a [PaletteEntry],
    /// `{world, vars, payload}` context for free-form expressions.
    pub context: &'a Value,
    pub limits: &'a Limits,
}

/// Check a submitted graph against `expected`, reporting every violation.
pub fn check_topology(
    expected: &ExpectedWorld,
    payload: &ArchitecturePayload,
    env: &TopologyEnv<'_>,
) -> Vec<String> {
    let mut errors = Vec::new();

    for rule in &expected.nodes {
        let found = payload
            .nodes
            .iter()
            .filter(|node| match_node(node, &rule.matcher))
            .count();
        let (min, max) = bounds(rule.count, rule.min, rule.max, (1, Some(1)));
        if !within(found, min, max) {
            errors.push(rule.message.clone().unwrap_or_else(|| {
                format!(
                    "Expected {} component(s) matching `{}`, found {found}.",
                    bounds_text(min, max),
                    describe(&rule.matcher)
                )
            }));
        }
    }

    for node in &payload.nodes {
        let covered = expected
            .nodes
            .iter()
            .any(|rule| match_node(node, &rule.matcher));
        if covered {
            continue;
        }
        let decoy = !node.palette_id.is_empty()
            && env
                .palette
                .iter()
                .any(|entry| entry.decoy && entry.id == node.palette_id);
        if !expected.allow_extra_nodes || decoy {
            errors.push(format!("Unexpected component: {}.", node.display_name()));
        }
    }

    for rule in &expected.links {
        let found = payload
            .links
            .iter()
            .filter(|link| {
                let (from, to) = endpoints(&payload.nodes, link);
                let forward = match_node(&from, &rule.from) && match_node(&to, &rule.to);
                forward
                    || (rule.bidirectional
                        && match_node(&to, &rule.from)
                        && match_node(&from, &rule.to))
            })
            .count();
        let (min, max) = bounds(rule.count, rule.min, rule.max, (1, None));
        if !within(found, min, max) {
            errors.push(rule.message.clone().unwrap_or_else(|| {
                format!(
                    "Expected {} connection(s) from `{}` to `{}`{}, found {found}.",
                    bounds_text(min, max),
                    describe(&rule.from),
                    describe(&rule.to),
                    if rule.bidirectional { " (either direction)" } else { "" }
                )
            }));
        }
    }

    if !expected.connections.is_empty() {
        let summary = summarize(payload);
        for rule in &expected.connections {
            let has = |from: &str, to: &str| {
                summary
                    .type_pairs
                    .iter()
                    .any(|pair| pair.from == from && pair.to == to)
            };
            let present = has(&rule.from, &rule.to) || (rule.bidirectional && has(&rule.to, &rule.from));
            let found = usize::from(present);
            let (min, max) = bounds(rule.count, rule.min, rule.max, (1, None));
            if !within(found, min, max) {
                errors.push(rule.message.clone().unwrap_or_else(|| {
                    if present {
                        format!("Connections from {} to {} are not allowed.", rule.from, rule.to)
                    } else {
                        format!("Expected a connection from {} to {}.", rule.from, rule.to)
                    }
                }));
            }
        }
    }

    for rule in &expected.expressions {
        let passed = match expr::evaluate(&rule.expr, env.context, env.limits) {
            Ok(value) => is_truthy(&value),
            Err(err) => {
                debug!(expr = %rule.expr, error = %err, "topology expression fault");
                false
            }
        };
        if !passed {
            errors.push(
                rule.message
                    .clone()
                    .unwrap_or_else(|| "The design does not meet a required condition.".to_string()),
            );
        }
    }

    errors
}

/// Resolve link endpoints by id, else alias, else label; fall back to echoed metadata.
fn endpoints<'a>(nodes: &'a [ArchNode], link: &ArchLink) -> (Cow<'a, ArchNode>, Cow<'a, ArchNode>) {
    (
        endpoint(nodes, &link.from, &link.from_type, &link.from_label),
        endpoint(nodes, &link.to, &link.to_type, &link.to_label),
    )
}

fn endpoint<'a>(nodes: &'a [ArchNode], key: &str, echoed_type: &str, echoed_label: &str) -> Cow<'a, ArchNode> {
    let found = nodes
        .iter()
        .find(|node| node.id == key)
        .or_else(|| nodes.iter().find(|node| !node.alias.is_empty() && node.alias == key))
        .or_else(|| nodes.iter().find(|node| !node.label.is_empty() && node.label == key));
    match found {
        Some(node) => Cow::Borrowed(node),
        None => Cow::Owned(ArchNode {
            id: key.to_string(),
            node_type: echoed_type.to_string(),
            label: echoed_label.to_string(),
            ..ArchNode::default()
        }),
    }
}

fn bounds(
    count: Option<usize>,
    min: Option<usize>,
    max: Option<usize>,
    default: (usize, Option<usize>),
) -> (usize, Option<usize>) {
    match (count, min, max) {
        (Some(count), _, _) => (count, Some(count)),
        (None, None, None) => default,
        (None, min, max) => {
            let floor = max.map_or(default.0, |max| default.0.min(max));
            (min.unwrap_or(floor), max)
        }
    }
}

fn within(found: usize, min: usize, max: Option<usize>) -> bool {
    found >= min && max.is_none_or(|max| found <= max)
}

fn bounds_text(min: usize, max: Option<usize>) -> String {
    match max {
        Some(max) if max == min => format!("exactly {min}"),
        Some(max) if min == 0 => format!("at most {max}"),
        Some(max) => format!("between {min} and {max}"),
        None => format!("at least {min}"),
    }
}
