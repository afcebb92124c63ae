//! Workload profiles and their expansion into an item list.
//!
//! A profile is an ordered timeline of segments. Each segment names a
//! language, an operation category, how many operations to issue and the
//! pause after each one. Segments come either from the compact
//! `<lang>-<letter><digit>d<millis>` form (`sql-i5d100`) or from the
//! per-category `*count` properties.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use tracing::debug;

use crate::error::{Error, Result};
use crate::operation::{Category, Language, OperationInstance, OperationTemplate, TemplateId};
use crate::workloads::{OperationCatalog, SchemaCounts};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionMode {
    /// Keep segment order (time-series replay).
    Timeline,
    /// Shuffle the whole list (steady-state mixed load).
    Shuffled,
}

impl FromStr for ExpansionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "timeline" => Ok(ExpansionMode::Timeline),
            "shuffled" => Ok(ExpansionMode::Shuffled),
            _ => Err(Error::config(format!("unknown mode {:?}", s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub language: Language,
    pub category: Category,
    pub count: u64,
    pub delay: Duration,
    /// Issue only this template instead of choosing among the category's templates.
    pub template: Option<String>,
}

impl Segment {
    pub fn new(language: Language, category: Category, count: u64, delay: Duration) -> Self {
        Segment {
            language,
            category,
            count,
            delay,
            template: None,
        }
    }

    pub fn pinned(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }
}

impl FromStr for Segment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            Error::config(format!(
                "invalid segment {:?}, expected <lang>-<category><count>d<millis>",
                s
            ))
        };
        let (lang, rest) = s.split_once('-').ok_or_else(invalid)?;
        let language: Language = lang.parse()?;
        let mut chars = rest.chars();
        let category = chars
            .next()
            .and_then(Category::from_letter)
            .ok_or_else(invalid)?;
        let count = chars
            .next()
            .and_then(|c| c.to_digit(10))
            .ok_or_else(invalid)?;
        let millis = chars.as_str().strip_prefix('d').ok_or_else(invalid)?;
        if millis.is_empty() || !millis.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let millis: u64 = millis.parse().map_err(|_| invalid())?;
        Ok(Segment::new(
            language,
            category,
            count as u64,
            Duration::from_millis(millis),
        ))
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}{}d{}",
            self.language,
            self.category.letter().unwrap_or('?'),
            self.count,
            self.delay.as_millis()
        )
    }
}

/// Ordered segments of one run. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkloadProfile {
    segments: Vec<Segment>,
}

impl WorkloadProfile {
    pub fn new(segments: Vec<Segment>) -> Self {
        WorkloadProfile { segments }
    }

    pub fn parse_timeline<S: AsRef<str>>(segments: &[S]) -> Result<Self> {
        segments
            .iter()
            .map(|s| s.as_ref().parse())
            .collect::<Result<Vec<Segment>>>()
            .map(Self::new)
    }

    /// One segment per category with a nonzero count, in category order.
    pub fn from_counts(language: Language, counts: &[(Category, u64)], delay: Duration) -> Self {
        let segments = Category::WORKLOAD
            .iter()
            .filter_map(|category| {
                let count: u64 = counts
                    .iter()
                    .filter(|(c, _)| c == category)
                    .map(|(_, n)| n)
                    .sum();
                (count > 0).then(|| Segment::new(language, *category, count, delay))
            })
            .collect();
        Self::new(segments)
    }

    pub fn scaled(&self, multiplier: u64) -> Self {
        let segments = self
            .segments
            .iter()
            .map(|s| Segment {
                count: s.count * multiplier,
                ..s.clone()
            })
            .collect();
        Self::new(segments)
    }

    /// Pins every segment of `category` that has no pin yet to `template`.
    pub fn pin(mut self, category: Category, template: &str) -> Self {
        for s in &mut self.segments {
            if s.category == category && s.template.is_none() {
                s.template = Some(template.to_string());
            }
        }
        self
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn total_operations(&self) -> u64 {
        self.segments.iter().map(|s| s.count).sum()
    }
}

#[derive(Debug, Clone)]
pub struct WorkloadItem {
    pub operation: OperationInstance,
    pub template_id: TemplateId,
    pub delay: Duration,
}

/// An expanded profile: the items to run and the templates they came from.
#[derive(Debug, Default)]
pub struct WorkloadPlan {
    pub items: Vec<WorkloadItem>,
    pub templates: BTreeMap<TemplateId, String>,
}

impl WorkloadPlan {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// One tab-separated line per item: id, template, language, delay, payload.
    pub fn dump<W: Write>(&self, mut out: W) -> io::Result<()> {
        for item in &self.items {
            let name = self
                .templates
                .get(&item.template_id)
                .map(String::as_str)
                .unwrap_or("?");
            writeln!(
                out,
                "{}\t{}\t{}\t{}ms\t{}",
                item.template_id,
                name,
                item.operation.language,
                item.delay.as_millis(),
                item.operation.render()
            )?;
        }
        out.flush()
    }
}

fn templates_for<'a>(
    catalog: &'a OperationCatalog,
    segment: &Segment,
) -> Result<Vec<&'a OperationTemplate>> {
    match &segment.template {
        Some(name) => match catalog.by_name(name, segment.language) {
            Some(t) if t.category == segment.category => Ok(vec![t]),
            _ => Err(Error::config(format!(
                "template {:?} is not a {} {} template of this catalog",
                name, segment.language, segment.category
            ))),
        },
        None => Ok(catalog.resolve(segment.category, segment.language)),
    }
}

/// Materializes `profile` against the row counts captured before the run.
pub fn expand(
    profile: &WorkloadProfile,
    catalog: &OperationCatalog,
    counts: &SchemaCounts,
    mode: ExpansionMode,
    rng: &mut dyn RngCore,
) -> Result<WorkloadPlan> {
    let mut plan = WorkloadPlan::default();
    for segment in profile.segments() {
        let templates = templates_for(catalog, segment)?;
        if templates.is_empty() {
            debug!(%segment, "no templates for segment, skipping");
            continue;
        }
        for _ in 0..segment.count {
            let template = templates[rng.gen_range(0..templates.len())];
            plan.templates
                .entry(template.id)
                .or_insert_with(|| template.qualified_name());
            plan.items.push(WorkloadItem {
                operation: template.instantiate(rng, counts),
                template_id: template.id,
                delay: segment.delay,
            });
        }
    }
    if mode == ExpansionMode::Shuffled {
        plan.items.shuffle(rng);
    }
    debug!(
        items = plan.items.len(),
        templates = plan.templates.len(),
        "expanded workload profile"
    );
    Ok(plan)
}
