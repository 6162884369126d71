//! Rule-based time budgets for benchmark runs.
//!
//! Larger water boxes get shorter runs and fewer repeated iterations; the
//! first rule whose threshold covers the parsed box size wins. Malformed
//! identifiers and uncovered sizes degrade to a skipped context with a
//! warning, never a hard failure.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Steps for every profiled run; profiling never skips.
const PROFILING_NSTEPS: i64 = 400;

/// One threshold rule. Rules are supplied in ascending `max_box_size` order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeControlRule {
    /// Rule applies to boxes up to this size.
    pub max_box_size: f64,

    /// `-nsteps` value for matching runs.
    pub nsteps: i64,

    /// `--resetstep` value for matching runs.
    pub resetstep: i64,

    /// Skip the context once the sweep iteration exceeds this.
    #[serde(default)]
    pub iteration_cutoff: Option<u32>,
}

/// Outcome of the time-control policy for one run context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeControlDecision {
    /// Extra solver arguments limiting the run length.
    pub args: Vec<String>,

    /// Whether the context should not run at all.
    pub skip: bool,
}

/// Select the time-control directive for one run context.
///
/// Profiling always gets the fixed short run. Otherwise the water-box
/// identifier is parsed as a magnitude (leading zeros stripped) and matched
/// against the rules in order; an `iteration_cutoff` on the winning rule
/// skips the context on later iterations.
pub fn select_time_control(
    water_box: &str,
    iteration: u32,
    profiling: bool,
    rules: &[TimeControlRule],
) -> TimeControlDecision {
    if profiling {
        return TimeControlDecision {
            args: vec!["-nsteps".to_string(), PROFILING_NSTEPS.to_string()],
            skip: false,
        };
    }

    let box_size: f64 = match water_box.trim_start_matches('0').parse() {
        Ok(v) => v,
        Err(_) => {
            warn!(water_box = %water_box, "could not parse water box identifier; no rules will match");
            return TimeControlDecision {
                args: Vec::new(),
                skip: true,
            };
        }
    };

    for rule in rules {
        if box_size <= rule.max_box_size {
            let skip = rule
                .iteration_cutoff
                .map(|cutoff| iteration > cutoff)
                .unwrap_or(false);
            return TimeControlDecision {
                args: vec![
                    "-nsteps".to_string(),
                    rule.nsteps.to_string(),
                    "--resetstep".to_string(),
                    rule.resetstep.to_string(),
                ],
                skip,
            };
        }
    }

    warn!(water_box = %water_box, "no matching time control rule");
    TimeControlDecision {
        args: Vec::new(),
        skip: true,
    }
}
