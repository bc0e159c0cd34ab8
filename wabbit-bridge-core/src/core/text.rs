//! Text example parser of the built-in core
//!
//! `[label] [importance] [base] ['tag] |namespace[:scale] feature[:value] ...`
//!
//! The label fields are interpreted according to the session's
//! [`LabelKind`]. Features are hashed into the model's table as they are
//! read, so a parsed example holds no strings besides its tag.

use example_syntax::{features, header};

use crate::error::CoreFailure;
use crate::label::LabelKind;

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Hash of the constant feature every example carries
pub const CONSTANT_FEATURE: u32 = 11_650_396;

/// Label of a parsed example
#[derive(Debug, Clone, PartialEq)]
pub enum Label {
    /// Test example, never used for an update
    Unlabeled,
    /// Real-valued target with an initial prediction offset
    Scalar { value: f32, base: f32 },
    /// 1-based class index
    Class(u32),
}

/// One hashed feature
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Feature {
    pub index: u32,
    pub value: f32,
}

/// Parsed example owned by the built-in core
#[derive(Debug, Clone, PartialEq)]
pub struct TextExample {
    pub label: Label,
    pub importance: f32,
    pub tag: Option<String>,
    pub features: Vec<Feature>,
}

impl TextExample {
    pub fn is_test(&self) -> bool {
        matches!(self.label, Label::Unlabeled)
    }

    /// Sum of squared feature values
    pub fn squared_norm(&self) -> f32 {
        self.features.iter().map(|f| f.value * f.value).sum()
    }
}

/// Parser settings derived from the core's options
#[derive(Debug, Clone, Copy)]
pub struct TextParser {
    pub kind: LabelKind,
    pub classes: u32,
    pub mask: u32,
}

impl TextParser {
    pub fn new(kind: LabelKind, classes: u32, bits: u8) -> Self {
        let mask = if bits >= 32 { u32::MAX } else { (1u32 << bits) - 1 };
        Self { kind, classes, mask }
    }

    /// Parse one record
    pub fn parse(&self, text: &str) -> Result<TextExample, CoreFailure> {
        let (head, rest) = text
            .split_once('|')
            .ok_or_else(|| CoreFailure::runtime("example has no '|' feature section"))?;

        let head = header::split(head);
        let (label, importance) = self.parse_label(&head.fields)?;

        // One slot per token plus the constant; pushes below never reallocate.
        let mut parsed = Vec::new();
        parsed.try_reserve(rest.split_whitespace().count() + 1)?;

        for segment in features::segments(rest) {
            let (space_hash, scale) = match segment.namespace {
                None => (0, 1.0),
                Some(token) => {
                    let (name, scale) = features::namespace(token).ok_or_else(|| {
                        CoreFailure::runtime(format!("malformed namespace '{token}'"))
                    })?;
                    (hash(name, 0), parse_number(scale, 1.0, "namespace scale")?)
                }
            };

            for token in segment.body.split_whitespace() {
                let (name, value) = features::feature(token)
                    .ok_or_else(|| CoreFailure::runtime(format!("malformed feature '{token}'")))?;
                let value = parse_number(value, 1.0, "feature value")? * scale;
                if value != 0.0 {
                    parsed.push(Feature { index: hash(name, space_hash) & self.mask, value });
                }
            }
        }

        parsed.push(Feature { index: CONSTANT_FEATURE & self.mask, value: 1.0 });

        Ok(TextExample {
            label,
            importance,
            tag: head.tag.map(str::to_string),
            features: parsed,
        })
    }

    fn parse_label(&self, fields: &[&str]) -> Result<(Label, f32), CoreFailure> {
        match (self.kind, fields) {
            (_, []) => Ok((Label::Unlabeled, 1.0)),
            (LabelKind::Scalar, [value, rest @ ..]) if rest.len() <= 2 => {
                let value = parse_field(value, "label")?;
                let importance = match rest.first() {
                    Some(field) => parse_importance(field)?,
                    None => 1.0,
                };
                let base = match rest.get(1) {
                    Some(field) => parse_field(field, "base")?,
                    None => 0.0,
                };
                Ok((Label::Scalar { value, base }, importance))
            }
            (LabelKind::Multiclass, [class, rest @ ..]) if rest.len() <= 1 => {
                let class: u32 = class
                    .parse()
                    .map_err(|_| CoreFailure::runtime(format!("malformed class label '{class}'")))?;
                if class == 0 || class > self.classes {
                    return Err(CoreFailure::runtime(format!(
                        "class label {class} outside 1..={}",
                        self.classes
                    )));
                }
                let importance = match rest.first() {
                    Some(field) => parse_importance(field)?,
                    None => 1.0,
                };
                Ok((Label::Class(class), importance))
            }
            (kind, fields) => Err(CoreFailure::runtime(format!(
                "too many label fields for a {kind} example: {}",
                fields.join(" ")
            ))),
        }
    }
}

fn parse_field(token: &str, what: &str) -> Result<f32, CoreFailure> {
    if !header::is_number(token) {
        return Err(CoreFailure::runtime(format!("malformed {what} '{token}'")));
    }
    match token.parse::<f32>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(CoreFailure::runtime(format!("malformed {what} '{token}'"))),
    }
}

fn parse_importance(token: &str) -> Result<f32, CoreFailure> {
    let importance = parse_field(token, "importance")?;
    if importance < 0.0 {
        return Err(CoreFailure::runtime(format!("negative importance '{token}'")));
    }
    Ok(importance)
}

fn parse_number(token: Option<&str>, default: f32, what: &str) -> Result<f32, CoreFailure> {
    match token {
        None => Ok(default),
        Some(token) => parse_field(token, what),
    }
}

/// FNV-1a over the name, seeded with the namespace hash
fn hash(name: &str, seed: u32) -> u32 {
    name.bytes().fold(FNV_OFFSET ^ seed, |acc, byte| (acc ^ byte as u32).wrapping_mul(FNV_PRIME))
}
