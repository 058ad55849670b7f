//! Pure schedule arithmetic: allocation normalisation, weakness floors,
//! template and fallback plans. No I/O.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use super::{DateRange, DraftSource, DraftTask, PlanDraft};
use crate::response::GeneratedPlan;

/// Default allocation, in round-robin order.
pub const TEMPLATE_ALLOCATION: [(&str, i32); 7] = [
    ("english-oral", 25),
    ("chinese-oral", 20),
    ("logic-thinking", 15),
    ("current-affairs", 15),
    ("science-knowledge", 10),
    ("personal-growth", 10),
    ("group-discussion", 5),
];

/// Minimum allocation percent for the weakness category.
pub const WEAKNESS_MIN_SHARE: i32 = 30;

/// Weakness percent used by the fallback plan.
pub const WEAKNESS_FALLBACK_SHARE: i32 = 40;

/// How many other categories share the rest of a fallback plan.
const FALLBACK_OTHER_CATEGORIES: usize = 6;

const TEMPLATE_SUGGESTIONS: &str = "This plan was built from the default template. \
     Review the category balance and adjust it to the target school.";

const WEAKNESS_FALLBACK_SUGGESTIONS: &str = "This plan was built from the default weakness \
     template: the weak category gets the opening days and the largest share.";

/// The seven standard categories in template order.
pub fn standard_categories() -> Vec<&'static str> {
    TEMPLATE_ALLOCATION.iter().map(|(c, _)| *c).collect()
}

pub fn template_allocation() -> BTreeMap<String, i32> {
    TEMPLATE_ALLOCATION
        .iter()
        .map(|(c, share)| ((*c).to_owned(), *share))
        .collect()
}

/// `ceil(0.4 * total_days)`.
pub fn required_weakness_days(total_days: usize) -> usize {
    (total_days * 2).div_ceil(5)
}

/// Split `total` into `parts` integers that differ by at most one, larger
/// ones first.
fn split_evenly(total: i32, parts: usize) -> Vec<i32> {
    if parts == 0 {
        return Vec::new();
    }
    let n = parts as i32;
    let base = total / n;
    let extra = (total % n) as usize;
    (0..parts)
        .map(|i| if i < extra { base + 1 } else { base })
        .collect()
}

fn draft_task(task_date: chrono::NaiveDate, category: &str, duration: i32) -> DraftTask {
    DraftTask {
        task_date,
        category: category.to_owned(),
        duration,
        question_ids: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Allocation
// ---------------------------------------------------------------------------

/// Scale raw shares to integer percentages summing to exactly 100.
///
/// Uses largest-remainder rounding; ties go to the category that sorts
/// first. Non-positive and non-finite shares are dropped, as are categories
/// that round to zero. An allocation with nothing positive yields the
/// template.
pub fn normalize_allocation(raw: &BTreeMap<String, f64>) -> BTreeMap<String, i32> {
    let positive: Vec<(&String, f64)> = raw
        .iter()
        .filter(|(_, v)| v.is_finite() && **v > 0.0)
        .map(|(k, v)| (k, *v))
        .collect();
    // Dividing by the largest share first keeps the sum finite.
    let largest = positive.iter().map(|(_, v)| *v).fold(0.0, f64::max);
    let scaled: Vec<f64> = positive.iter().map(|(_, v)| v / largest).collect();
    let total: f64 = scaled.iter().sum();
    if positive.is_empty() || !total.is_finite() || total <= 0.0 {
        return template_allocation();
    }

    let exact: Vec<f64> = scaled.iter().map(|v| v / total * 100.0).collect();
    let mut shares: Vec<i32> = exact.iter().map(|e| e.floor() as i32).collect();
    let assigned: i32 = shares.iter().sum();
    let mut order: Vec<usize> = (0..exact.len()).collect();
    // Stable sort keeps key order among equal remainders.
    order.sort_by(|a, b| {
        let ra = exact[*a] - exact[*a].floor();
        let rb = exact[*b] - exact[*b].floor();
        rb.total_cmp(&ra)
    });
    for idx in order.into_iter().take((100 - assigned).max(0) as usize) {
        shares[idx] += 1;
    }

    positive
        .into_iter()
        .zip(shares)
        .filter(|(_, share)| *share > 0)
        .map(|((k, _), share)| (k.clone(), share))
        .collect()
}

/// Raise `weakness` to at least [`WEAKNESS_MIN_SHARE`] percent.
///
/// When raised, the remaining percent is split evenly over the other
/// present categories so the total stays 100. Returns whether anything
/// changed.
pub fn enforce_weakness_share(alloc: &mut BTreeMap<String, i32>, weakness: &str) -> bool {
    let current = alloc.get(weakness).copied().unwrap_or(0);
    if current >= WEAKNESS_MIN_SHARE {
        return false;
    }
    let share = WEAKNESS_MIN_SHARE.max(current);

    let others: Vec<String> = alloc.keys().filter(|k| *k != weakness).cloned().collect();
    alloc.clear();
    if others.is_empty() {
        alloc.insert(weakness.to_owned(), 100);
    } else {
        alloc.insert(weakness.to_owned(), share);
        let parts = split_evenly(100 - share, others.len());
        for (category, part) in others.into_iter().zip(parts) {
            if part > 0 {
                alloc.insert(category, part);
            }
        }
    }
    debug!(weakness, from = current, to = share, "raised weakness share");
    true
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Reassign tasks to `weakness` until it has `ceil(0.4 * total_days)` of
/// them. The earliest non-matching tasks are reassigned first. Returns how
/// many were reassigned.
pub fn enforce_weakness_days(tasks: &mut [DraftTask], weakness: &str, total_days: usize) -> usize {
    let required = required_weakness_days(total_days);
    let have = tasks.iter().filter(|t| t.category == weakness).count();
    if have >= required {
        return 0;
    }
    let deficit = required - have;
    let mut reassigned = 0;
    for task in tasks.iter_mut().filter(|t| t.category != weakness) {
        if reassigned == deficit {
            break;
        }
        task.category = weakness.to_owned();
        reassigned += 1;
    }
    debug!(weakness, required, reassigned, "reassigned tasks to weakness");
    reassigned
}

/// Add a task for every day of `range` that has none, cycling through
/// `categories`, then sort tasks by date. Returns how many were added.
pub fn pad_missing_days(
    tasks: &mut Vec<DraftTask>,
    range: &DateRange,
    daily_duration: i32,
    categories: &[String],
) -> usize {
    if categories.is_empty() {
        return 0;
    }
    let covered: BTreeSet<_> = tasks.iter().map(|t| t.task_date).collect();
    let missing: Vec<_> = range.days().filter(|d| !covered.contains(d)).collect();
    for (i, day) in missing.iter().enumerate() {
        tasks.push(draft_task(*day, &categories[i % categories.len()], daily_duration));
    }
    tasks.sort_by_key(|t| t.task_date);
    missing.len()
}

/// Turn validated generator output into a draft that satisfies the
/// schedule invariants for `range`.
pub fn finalize_generated(plan: GeneratedPlan, range: &DateRange, daily_duration: i32) -> PlanDraft {
    let category_allocation = normalize_allocation(&plan.category_allocation);

    let received = plan.daily_tasks.len();
    let mut tasks: Vec<DraftTask> = plan
        .daily_tasks
        .into_iter()
        .filter(|t| range.contains(t.task_date))
        .map(|t| DraftTask {
            task_date: t.task_date,
            category: t.category,
            duration: if t.duration > 0 { t.duration } else { daily_duration },
            question_ids: t.question_ids,
        })
        .collect();
    if tasks.len() < received {
        warn!(
            dropped = received - tasks.len(),
            "generator scheduled tasks outside the date range"
        );
    }

    let categories: Vec<String> = category_allocation.keys().cloned().collect();
    let padded = pad_missing_days(&mut tasks, range, daily_duration, &categories);
    if padded > 0 {
        debug!(padded, "filled days the generator left empty");
    }

    PlanDraft {
        category_allocation,
        ai_suggestions: plan.ai_suggestions,
        tasks,
        source: DraftSource::Generated,
    }
}

/// Apply both weakness floors to a draft.
pub fn enforce_weakness(draft: &mut PlanDraft, weakness: &str, total_days: usize) {
    enforce_weakness_share(&mut draft.category_allocation, weakness);
    enforce_weakness_days(&mut draft.tasks, weakness, total_days);
}

// ---------------------------------------------------------------------------
// Static plans
// ---------------------------------------------------------------------------

/// The default plan: template allocation, categories assigned round-robin.
pub fn template_draft(range: &DateRange, daily_duration: i32) -> PlanDraft {
    let categories = standard_categories();
    let tasks = range
        .days()
        .enumerate()
        .map(|(i, day)| draft_task(day, categories[i % categories.len()], daily_duration))
        .collect();
    PlanDraft {
        category_allocation: template_allocation(),
        ai_suggestions: TEMPLATE_SUGGESTIONS.to_owned(),
        tasks,
        source: DraftSource::Template,
    }
}

/// The plan used when weakness plan generation fails entirely.
///
/// The weakness gets [`WEAKNESS_FALLBACK_SHARE`] percent and the earliest
/// `ceil(0.4 * total_days)` days. The rest is split evenly over the first
/// six standard categories other than the weakness; categories whose share
/// would be zero are left out.
pub fn weakness_fallback_draft(weakness: &str, range: &DateRange, daily_duration: i32) -> PlanDraft {
    let others: Vec<&str> = standard_categories()
        .into_iter()
        .filter(|c| *c != weakness)
        .take(FALLBACK_OTHER_CATEGORIES)
        .collect();

    let mut category_allocation = BTreeMap::from([(weakness.to_owned(), WEAKNESS_FALLBACK_SHARE)]);
    let parts = split_evenly(100 - WEAKNESS_FALLBACK_SHARE, others.len());
    let mut rotation: Vec<&str> = Vec::with_capacity(others.len());
    for (category, part) in others.iter().zip(parts) {
        if part > 0 {
            category_allocation.insert((*category).to_owned(), part);
            rotation.push(*category);
        }
    }
    if rotation.is_empty() {
        category_allocation.insert(weakness.to_owned(), 100);
    }

    let weakness_days = required_weakness_days(range.total_days());
    let tasks = range
        .days()
        .enumerate()
        .map(|(i, day)| {
            let category = if i < weakness_days || rotation.is_empty() {
                weakness
            } else {
                rotation[(i - weakness_days) % rotation.len()]
            };
            draft_task(day, category, daily_duration)
        })
        .collect();

    PlanDraft {
        category_allocation,
        ai_suggestions: WEAKNESS_FALLBACK_SUGGESTIONS.to_owned(),
        tasks,
        source: DraftSource::WeaknessFallback,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
