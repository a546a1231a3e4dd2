//! Nesting of patterns onto rectangular material sheets.
//!
//! Patterns are packed by their (rotated) bounding boxes with a
//! best-fit-decreasing heuristic: largest first, each into the free
//! rectangle that leaves the least unused area. Every opened sheet keeps a
//! guillotine free-rectangle list.

mod free_rect;

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use tracing::{debug, warn};

use crate::budget::{BudgetClock, SolverBudget};
use crate::error::{NestingError, Result, SheetfoldError};
use crate::math::{Aabb2, Point2};
use crate::pattern::{Pattern, PatternId, PatternStore};

use free_rect::FreeRectangles;

const EPS: f64 = 1e-9;

/// A rectangular piece of stock material.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MaterialSheet {
    pub width: f64,
    pub height: f64,
}

impl MaterialSheet {
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// Placement heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum NestingStrategy {
    /// Largest first, each into the tightest free rectangle.
    #[default]
    BestFitDecreasing,
}

impl fmt::Display for NestingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BestFitDecreasing => f.write_str("best_fit_decreasing"),
        }
    }
}

impl FromStr for NestingStrategy {
    type Err = SheetfoldError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "best_fit_decreasing" | "bfd" => Ok(Self::BestFitDecreasing),
            other => Err(SheetfoldError::InvalidInput(format!(
                "unknown nesting strategy '{other}'"
            ))),
        }
    }
}

/// Configuration for [`Nest`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct NestingConfig {
    pub strategy: NestingStrategy,
    /// Minimum gap between parts.
    pub spacing: f64,
    /// Inset from every sheet edge.
    pub margin: f64,
    /// Maximum number of sheets to open (0 = unlimited).
    pub max_sheets: usize,
    /// Sampled angles per full turn for freely rotatable patterns.
    pub free_rotation_steps: usize,
    /// Join adjacent free rectangles after every placement.
    pub merge_free_rects: bool,
    /// Maximum computation time in milliseconds (0 = unlimited).
    pub time_limit_ms: u64,
    /// Maximum number of candidate evaluations (0 = unlimited).
    pub max_evaluations: usize,
}

impl Default for NestingConfig {
    fn default() -> Self {
        Self {
            strategy: NestingStrategy::default(),
            spacing: 0.0,
            margin: 0.0,
            max_sheets: 0,
            free_rotation_steps: 8,
            merge_free_rects: true,
            time_limit_ms: 0,
            max_evaluations: 0,
        }
    }
}

impl NestingConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: NestingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_spacing(mut self, spacing: f64) -> Self {
        self.spacing = spacing;
        self
    }

    #[must_use]
    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin = margin;
        self
    }

    #[must_use]
    pub fn with_max_sheets(mut self, max_sheets: usize) -> Self {
        self.max_sheets = max_sheets;
        self
    }

    #[must_use]
    pub fn with_free_rotation_steps(mut self, steps: usize) -> Self {
        self.free_rotation_steps = steps;
        self
    }

    #[must_use]
    pub fn with_merge_free_rects(mut self, merge: bool) -> Self {
        self.merge_free_rects = merge;
        self
    }

    #[must_use]
    pub fn with_time_limit(mut self, ms: u64) -> Self {
        self.time_limit_ms = ms;
        self
    }

    #[must_use]
    pub fn with_max_evaluations(mut self, max_evaluations: usize) -> Self {
        self.max_evaluations = max_evaluations;
        self
    }
}

/// Where one pattern goes.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub pattern: PatternId,
    /// Insertion index of the pattern in its store.
    pub index: usize,
    /// Index into [`NestingResult::sheets`].
    pub sheet: usize,
    /// Min corner of the rotated pattern's bounding box on the sheet.
    pub position: Point2,
    /// Rotation about the pattern origin, in radians.
    pub rotation: f64,
    /// Region the pattern occupies on the sheet.
    pub bounds: Aabb2,
}

impl Placement {
    /// The pattern moved to its place on the sheet.
    #[must_use]
    pub fn apply(&self, pattern: &Pattern) -> Pattern {
        let rotated = pattern.rotated(self.rotation);
        let min = rotated.aabb().min;
        rotated.translated(self.position.x - min.x, self.position.y - min.y)
    }
}

/// Outcome of a nesting run.
#[derive(Debug, Clone, PartialEq)]
pub struct NestingResult {
    /// Placements in placement order.
    pub placements: Vec<Placement>,
    /// Sizes of the sheets used, in opening order.
    pub sheets: Vec<MaterialSheet>,
    /// Placed area over sheet area, per used sheet.
    pub sheet_utilization: Vec<f64>,
    /// Total placed area over total used sheet area.
    pub utilization: f64,
    pub evaluations: usize,
    pub computation_time_ms: u64,
}

impl NestingResult {
    #[must_use]
    pub fn sheets_used(&self) -> usize {
        self.sheets.len()
    }

    /// Placement of a given pattern.
    #[must_use]
    pub fn placement_of(&self, id: PatternId) -> Option<&Placement> {
        self.placements.iter().find(|p| p.pattern == id)
    }

    /// Placements on one sheet.
    pub fn on_sheet(&self, sheet: usize) -> impl Iterator<Item = &Placement> + '_ {
        self.placements.iter().filter(move |p| p.sheet == sheet)
    }
}

/// One sheet opened during a run.
#[derive(Debug)]
struct OpenSheet {
    size: MaterialSheet,
    free: FreeRectangles,
    placed_area: f64,
}

/// A candidate position, compared by leftover area and then position.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    score: f64,
    sheet: usize,
    rect: usize,
    x: f64,
    y: f64,
    rotation: usize,
    width: f64,
    height: f64,
}

impl Candidate {
    fn cmp_key(&self, other: &Self) -> Ordering {
        let by_float = |a: f64, b: f64| {
            if (a - b).abs() <= EPS {
                Ordering::Equal
            } else {
                a.total_cmp(&b)
            }
        };
        by_float(self.score, other.score)
            .then(self.sheet.cmp(&other.sheet))
            .then(by_float(self.y, other.y))
            .then(by_float(self.x, other.x))
            .then(self.rotation.cmp(&other.rotation))
    }
}

/// A pattern ready to be packed.
#[derive(Debug)]
struct Item<'a> {
    id: PatternId,
    index: usize,
    pattern: &'a Pattern,
    angles: Vec<f64>,
    /// Rotated bounding boxes, one per angle.
    boxes: Vec<Aabb2>,
}

/// Nesting operation.
///
/// # Example
///
/// ```
/// use sheetfold::nesting::{MaterialSheet, Nest};
/// use sheetfold::pattern::{Pattern, PatternStore};
///
/// let store: PatternStore = [Pattern::rectangle(10.0, 10.0), Pattern::rectangle(10.0, 10.0)]
///     .into_iter()
///     .collect::<Result<_, _>>()
///     .unwrap();
/// let result = Nest::new(&store)
///     .with_sheets(vec![MaterialSheet::new(20.0, 10.0)])
///     .execute()
///     .unwrap();
/// assert_eq!(result.sheets_used(), 1);
/// ```
#[derive(Debug)]
pub struct Nest<'a> {
    store: &'a PatternStore,
    sheets: Vec<MaterialSheet>,
    config: NestingConfig,
}

impl<'a> Nest<'a> {
    #[must_use]
    pub fn new(store: &'a PatternStore) -> Self {
        Self {
            store,
            sheets: Vec::new(),
            config: NestingConfig::default(),
        }
    }

    /// Sheet sizes, consumed in order; the last one repeats.
    #[must_use]
    pub fn with_sheets(mut self, sheets: Vec<MaterialSheet>) -> Self {
        self.sheets = sheets;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: NestingConfig) -> Self {
        self.config = config;
        self
    }

    /// Packs every pattern of the store.
    ///
    /// # Errors
    ///
    /// - `SheetfoldError::InvalidInput` for an empty sheet list, a
    ///   non-positive sheet size, or negative spacing or margin
    /// - `NestingError::OutOfMaterial` if a pattern fits no sheet size or
    ///   the sheet limit is reached
    /// - `SolverError::Timeout` if the time or evaluation budget runs out
    pub fn execute(&self) -> Result<NestingResult> {
        self.validate()?;
        let config = &self.config;
        let clock = BudgetClock::start(
            "nesting",
            SolverBudget::new()
                .with_max_iterations(config.max_evaluations)
                .with_time_limit(config.time_limit_ms),
            usize::MAX,
        );

        let items = self.ordered_items();
        let last = self.sheets.len() - 1;
        let mut open: Vec<OpenSheet> = Vec::new();
        let mut cursor = 0;
        let mut placements = Vec::with_capacity(items.len());
        let mut evaluations = 0;

        for item in &items {
            self.check_fits_some_sheet(item)?;

            let mut best = self.best_candidate(item, &open, 0, &mut evaluations, &clock)?;
            while best.is_none() {
                let next = open.len();
                if config.max_sheets > 0 && next >= config.max_sheets {
                    warn!(max_sheets = config.max_sheets, "sheet limit reached");
                    return Err(NestingError::OutOfMaterial(format!(
                        "pattern {} does not fit on the {} allowed sheet(s)",
                        item.index, config.max_sheets
                    ))
                    .into());
                }
                // Sizes too small for this pattern are passed over, never opened.
                let from = cursor.min(last);
                let Some(index) = (from..=last).find(|&i| self.fits_empty(item, self.sheets[i]))
                else {
                    return Err(NestingError::OutOfMaterial(format!(
                        "pattern {} fits none of the remaining sheet sizes",
                        item.index
                    ))
                    .into());
                };
                if index > from {
                    debug!(skipped = index - from, "passed over sheet sizes too small for pattern");
                }
                cursor = index + 1;

                let size = self.sheets[index];
                let (width, height) = self.usable(size);
                open.push(OpenSheet {
                    size,
                    free: FreeRectangles::new(width, height),
                    placed_area: 0.0,
                });
                debug!(sheet = next, width = size.width, height = size.height, "opened sheet");

                best = self.best_candidate(item, &open, next, &mut evaluations, &clock)?;
                if best.is_none() {
                    return Err(NestingError::OutOfMaterial(format!(
                        "pattern {} does not fit an empty {} x {} sheet",
                        item.index, size.width, size.height
                    ))
                    .into());
                }
            }

            let Some(chosen) = best else {
                continue;
            };
            let sheet = &mut open[chosen.sheet];
            sheet
                .free
                .place(chosen.rect, chosen.width, chosen.height, config.merge_free_rects);
            sheet.placed_area += item.pattern.area();

            let rotated = item.boxes[chosen.rotation];
            let position = Point2::new(config.margin + chosen.x, config.margin + chosen.y);
            placements.push(Placement {
                pattern: item.id,
                index: item.index,
                sheet: chosen.sheet,
                position,
                rotation: item.angles[chosen.rotation],
                bounds: Aabb2 {
                    min: position,
                    max: Point2::new(
                        position.x + rotated.width(),
                        position.y + rotated.height(),
                    ),
                },
            });
        }

        let free_area: f64 = open.iter().map(|s| s.free.free_area()).sum();
        let result = finish(placements, &open, evaluations, clock.elapsed_ms());
        debug!(
            patterns = result.placements.len(),
            sheets = result.sheets_used(),
            utilization = result.utilization,
            free_area,
            evaluations,
            "nesting finished"
        );
        Ok(result)
    }

    fn validate(&self) -> Result<()> {
        if self.sheets.is_empty() {
            return Err(SheetfoldError::InvalidInput("no material sheets given".into()));
        }
        if let Some(s) = self
            .sheets
            .iter()
            .find(|s| !(s.width > 0.0 && s.height > 0.0) || !s.area().is_finite())
        {
            return Err(SheetfoldError::InvalidInput(format!(
                "sheet size {} x {} must be positive",
                s.width, s.height
            )));
        }
        let c = &self.config;
        if !(c.spacing >= 0.0 && c.margin >= 0.0) {
            return Err(SheetfoldError::InvalidInput(
                "spacing and margin must be non-negative".into(),
            ));
        }
        Ok(())
    }

    /// Free space of a sheet; parts reserve `spacing` on their right and
    /// top, so the usable area grows by one spacing.
    fn usable(&self, sheet: MaterialSheet) -> (f64, f64) {
        let c = &self.config;
        (
            (sheet.width - 2.0 * c.margin + c.spacing).max(0.0),
            (sheet.height - 2.0 * c.margin + c.spacing).max(0.0),
        )
    }

    /// Patterns by descending bounding-box area, then descending perimeter,
    /// then insertion order.
    fn ordered_items(&self) -> Vec<Item<'a>> {
        let steps = self.config.free_rotation_steps;
        let mut items: Vec<Item<'a>> = self
            .store
            .iter()
            .enumerate()
            .map(|(index, (id, pattern))| {
                let angles = pattern.rotation().angles(steps);
                let boxes = angles.iter().map(|&a| pattern.aabb_at_rotation(a)).collect();
                Item {
                    id,
                    index,
                    pattern,
                    angles,
                    boxes,
                }
            })
            .collect();
        items.sort_by(|a, b| {
            b.pattern
                .aabb()
                .area()
                .total_cmp(&a.pattern.aabb().area())
                .then(b.pattern.perimeter().total_cmp(&a.pattern.perimeter()))
                .then(a.index.cmp(&b.index))
        });
        items
    }

    /// Whether some rotation of the item fits an empty sheet of this size.
    fn fits_empty(&self, item: &Item<'_>, size: MaterialSheet) -> bool {
        let spacing = self.config.spacing;
        let (w, h) = self.usable(size);
        item.boxes
            .iter()
            .any(|b| b.width() + spacing <= w + EPS && b.height() + spacing <= h + EPS)
    }

    fn check_fits_some_sheet(&self, item: &Item<'_>) -> Result<()> {
        let fits = self.sheets.iter().any(|&s| self.fits_empty(item, s));
        if fits {
            Ok(())
        } else {
            Err(NestingError::OutOfMaterial(format!(
                "pattern {} fits no sheet size at any allowed rotation",
                item.index
            ))
            .into())
        }
    }

    /// Best position over the sheets from `first_sheet` on.
    fn best_candidate(
        &self,
        item: &Item<'_>,
        open: &[OpenSheet],
        first_sheet: usize,
        evaluations: &mut usize,
        clock: &BudgetClock,
    ) -> Result<Option<Candidate>> {
        let spacing = self.config.spacing;
        let mut best: Option<Candidate> = None;
        for (s, sheet) in open.iter().enumerate().skip(first_sheet) {
            for (r, bounds) in item.boxes.iter().enumerate() {
                let width = bounds.width() + spacing;
                let height = bounds.height() + spacing;
                for (k, rect) in sheet.free.rects().iter().enumerate() {
                    clock.check(*evaluations)?;
                    *evaluations += 1;
                    if !rect.fits(width, height) {
                        continue;
                    }
                    let candidate = Candidate {
                        score: rect.area() - width * height,
                        sheet: s,
                        rect: k,
                        x: rect.x,
                        y: rect.y,
                        rotation: r,
                        width,
                        height,
                    };
                    if best.is_none_or(|b| candidate.cmp_key(&b) == Ordering::Less) {
                        best = Some(candidate);
                    }
                }
            }
        }
        Ok(best)
    }
}

/// Drops sheets that stayed empty and computes utilization.
fn finish(
    mut placements: Vec<Placement>,
    open: &[OpenSheet],
    evaluations: usize,
    computation_time_ms: u64,
) -> NestingResult {
    let mut remap = vec![usize::MAX; open.len()];
    let mut sheets = Vec::new();
    let mut sheet_utilization = Vec::new();
    let mut placed = 0.0;
    let mut total = 0.0;
    for (i, sheet) in open.iter().enumerate() {
        if sheet.placed_area <= 0.0 {
            continue;
        }
        remap[i] = sheets.len();
        sheets.push(sheet.size);
        sheet_utilization.push(sheet.placed_area / sheet.size.area());
        placed += sheet.placed_area;
        total += sheet.size.area();
    }
    for p in &mut placements {
        p.sheet = remap[p.sheet];
    }
    NestingResult {
        placements,
        sheets,
        sheet_utilization,
        utilization: if total > 0.0 { placed / total } else { 0.0 },
        evaluations,
        computation_time_ms,
    }
}

/// Nests `store` onto `sheets` with the default configuration.
///
/// # Errors
///
/// See [`Nest::execute`].
pub fn optimize(store: &PatternStore, sheets: Vec<MaterialSheet>) -> Result<NestingResult> {
    Nest::new(store).with_sheets(sheets).execute()
}
