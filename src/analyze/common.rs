// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! The generic condition analyzer and the condition status constructors
//! shared by the kind-specific analyzers.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::ConditionAnalyzer;
use crate::status::{Condition, ConditionStatus, ConditionValue, Status, Verdict};

/// Matches condition types. Both forms are case-insensitive.
#[derive(Debug, Clone)]
pub enum Matcher {
    Exact(String),
    Pattern(Regex),
}

impl Matcher {
    pub fn matches(&self, s: &str) -> bool {
        match self {
            Matcher::Exact(want) => want.eq_ignore_ascii_case(s),
            Matcher::Pattern(re) => re.is_match(s),
        }
    }
}

pub fn string_matchers(patterns: &[&str]) -> Vec<Matcher> {
    patterns
        .iter()
        .map(|p| Matcher::Exact(p.to_string()))
        .collect()
}

pub fn regex_matchers(patterns: &[&str]) -> Vec<Matcher> {
    patterns
        .iter()
        .map(|p| {
            // Patterns are static configuration; an invalid one is a bug.
            Matcher::Pattern(
                Regex::new(&format!("(?i){p}")).expect("invalid condition matcher pattern"),
            )
        })
        .collect()
}

/// Condition analyzer configurable for any condition type.
///
/// By default a matched condition has positive polarity: `True` is Ok and
/// `False` is an error. Types matched by `reversed_polarity_conditions` are
/// treated the other way around (`Degraded`-style conditions, where `True`
/// is the bad state).
///
/// A matched condition in its bad state analyzes as Error unless the type is
/// also matched by `progressing_conditions`, `warning_conditions` or
/// `unknown_conditions`, which override the severity. The sets are checked
/// in that fixed order, so a type matched by several of them resolves to the
/// last match (Unknown wins over Warning).
#[derive(Debug, Clone, Default)]
pub struct GenericConditionAnalyzer {
    pub conditions: Vec<Matcher>,
    pub reversed_polarity_conditions: Vec<Matcher>,
    pub progressing_conditions: Vec<Matcher>,
    pub warning_conditions: Vec<Matcher>,
    pub unknown_conditions: Vec<Matcher>,
}

struct MatchOutcome {
    reverse: bool,
    progressing: bool,
    result: Verdict,
}

impl GenericConditionAnalyzer {
    fn match_type(&self, cond_type: &str) -> Option<MatchOutcome> {
        let mut matched = false;
        let mut reverse = false;
        let mut progressing = false;
        let mut result = Verdict::Unknown;

        if self.conditions.iter().any(|m| m.matches(cond_type)) {
            matched = true;
            result = Verdict::Error;
        }

        if self
            .reversed_polarity_conditions
            .iter()
            .any(|m| m.matches(cond_type))
        {
            matched = true;
            reverse = true;
            // Error by default; the sets below may still override it.
            result = Verdict::Error;
        }

        if self
            .progressing_conditions
            .iter()
            .any(|m| m.matches(cond_type))
        {
            matched = true;
            progressing = true;
            result = Verdict::Unknown;
        }

        if self.warning_conditions.iter().any(|m| m.matches(cond_type)) {
            matched = true;
            result = Verdict::Warning;
        }

        if self.unknown_conditions.iter().any(|m| m.matches(cond_type)) {
            matched = true;
            result = Verdict::Unknown;
        }

        matched.then_some(MatchOutcome {
            reverse,
            progressing,
            result,
        })
    }
}

impl ConditionAnalyzer for GenericConditionAnalyzer {
    fn analyze(&self, cond: &Condition) -> Option<ConditionStatus> {
        let outcome = self.match_type(&cond.type_)?;

        let (result, progressing) = if (!outcome.reverse && cond.status == ConditionValue::False)
            || (outcome.reverse && cond.status == ConditionValue::True)
        {
            (outcome.result, outcome.progressing)
        } else if cond.status == ConditionValue::Unknown {
            (Verdict::Unknown, false)
        } else {
            (Verdict::Ok, false)
        };

        Some(ConditionStatus {
            condition: cond.clone(),
            status: Status::new(result, progressing),
        })
    }
}

/// Condition analyzers applicable to a broad range of resources, calibrated
/// for the cross-cutting Kubernetes conventions (`Ready`, `Progressing`,
/// `*Degraded`, `*Pressure`, `*Detected`, `Terminating`, `Disabled`).
pub fn default_condition_analyzers() -> Vec<Arc<dyn ConditionAnalyzer>> {
    static COMMON: LazyLock<Arc<GenericConditionAnalyzer>> = LazyLock::new(|| {
        let mut reversed = regex_matchers(&["Degraded", "Pressure", "Detected", "Terminating"]);
        reversed.extend(string_matchers(&["Progressing"]));
        Arc::new(GenericConditionAnalyzer {
            conditions: string_matchers(&["Ready"]),
            reversed_polarity_conditions: reversed,
            progressing_conditions: string_matchers(&["Progressing"]),
            warning_conditions: regex_matchers(&["Pressure", "Detected"]),
            unknown_conditions: regex_matchers(&["Disabled"]),
        })
    });

    vec![COMMON.clone() as Arc<dyn ConditionAnalyzer>]
}

fn condition_status(cond: Condition, result: Verdict, progressing: bool) -> ConditionStatus {
    ConditionStatus {
        condition: cond,
        status: Status::new(result, progressing),
    }
}

pub fn condition_status_ok(cond: Condition) -> ConditionStatus {
    condition_status(cond, Verdict::Ok, false)
}

pub fn condition_status_warning(cond: Condition) -> ConditionStatus {
    condition_status(cond, Verdict::Warning, false)
}

pub fn condition_status_error(cond: Condition) -> ConditionStatus {
    condition_status(cond, Verdict::Error, false)
}

pub fn condition_status_progressing(cond: Condition) -> ConditionStatus {
    condition_status(cond, Verdict::Unknown, true)
}

pub fn condition_status_unknown(cond: Condition) -> ConditionStatus {
    condition_status(cond, Verdict::Unknown, false)
}

pub fn condition_status_unknown_with_error(cond: Condition, err: &anyhow::Error) -> ConditionStatus {
    let mut ret = condition_status(cond, Verdict::Unknown, false);
    ret.status.err = Some(format!("{err:#}"));
    ret
}

/// Fabricate a condition that is not present in the object, to surface a
/// derived signal (a pod phase, a missing install plan). Synthetic
/// conditions carry no transition time.
pub fn synthetic_condition(cond_type: &str, status: bool, reason: &str, message: &str) -> Condition {
    Condition {
        type_: cond_type.to_string(),
        status: if status {
            ConditionValue::True
        } else {
            ConditionValue::False
        },
        reason: reason.to_string(),
        message: message.to_string(),
        last_transition_time: None,
    }
}

pub fn synthetic_condition_ok(cond_type: &str, message: &str) -> ConditionStatus {
    condition_status_ok(synthetic_condition(cond_type, true, "", message))
}

pub fn synthetic_condition_warning(cond_type: &str, reason: &str, message: &str) -> ConditionStatus {
    condition_status_warning(synthetic_condition(cond_type, true, reason, message))
}

pub fn synthetic_condition_progressing(
    cond_type: &str,
    reason: &str,
    message: &str,
) -> ConditionStatus {
    condition_status_progressing(synthetic_condition(cond_type, true, reason, message))
}

pub fn synthetic_condition_error(cond_type: &str, reason: &str, message: &str) -> ConditionStatus {
    condition_status_error(synthetic_condition(cond_type, true, reason, message))
}
