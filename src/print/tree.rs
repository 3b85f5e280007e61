// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Tree rendering of status trees in a tabular format.

use chrono::{DateTime, Utc};

use crate::status::{ConditionStatus, ObjectStatus, Status, Verdict};

const OBJECT_COL_WIDTH: usize = 15;
const CONDITION_COL_WIDTH: usize = 30;
const AGE_COL_WIDTH: usize = 5;
const CELL_SEP: &str = "  ";

/// Maximum lines of a condition message shown under the condition row.
const MAX_MESSAGE_LINES: usize = 3;

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Default)]
pub struct PrintOptions {
    /// Print condition details and subtrees for healthy objects too.
    pub show_ok: bool,
    /// Show the API group next to each object.
    pub show_group: bool,
    pub color: bool,
}

/// Prints status trees in a column-aligned tree format:
///
/// ```text
/// OBJECT           CONDITION                       AGE    REASON
/// Ok default/Deployment/dp1
/// │                Available=True                  24h    MinimumReplicasAvailable
/// └─ Ok ReplicaSet/rs1
///    │             ReplicasReady=True                     Ready
///    └─ Ok Pod/p1
/// ```
pub struct TreePrinter {
    opts: PrintOptions,
}

impl TreePrinter {
    pub fn new(opts: PrintOptions) -> Self {
        Self { opts }
    }

    pub fn render(&self, statuses: &[ObjectStatus]) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "{}{}{}{}{}{}{}\n",
            pad("OBJECT", OBJECT_COL_WIDTH),
            CELL_SEP,
            pad("CONDITION", CONDITION_COL_WIDTH),
            CELL_SEP,
            pad("AGE", AGE_COL_WIDTH),
            CELL_SEP,
            "REASON",
        ));

        let mut sorted: Vec<&ObjectStatus> = statuses.iter().collect();
        sort_objects(&mut sorted);

        for obj in sorted {
            let print_subtree = !obj.sub_statuses.is_empty() && self.should_print_details(obj);
            let prefix_tail = if print_subtree { "│ " } else { "" };
            self.render_object_with_conditions(&mut out, obj, "", prefix_tail, true);
            if print_subtree {
                self.render_subtree(&mut out, &obj.sub_statuses, "");
            }
        }

        out
    }

    /// Details of healthy objects are noise unless asked for.
    fn should_print_details(&self, obj: &ObjectStatus) -> bool {
        self.opts.show_ok || obj.status.result > Verdict::Ok || obj.status.progressing
    }

    fn render_object_with_conditions(
        &self,
        out: &mut String,
        obj: &ObjectStatus,
        prefix_head: &str,
        prefix_tail: &str,
        root: bool,
    ) {
        out.push_str(prefix_head);
        out.push_str(&self.format_object(obj, root));
        out.push('\n');

        if self.should_print_details(obj) {
            self.render_conditions(out, &obj.conditions, prefix_tail);
        }
    }

    fn render_conditions(&self, out: &mut String, conditions: &[ConditionStatus], prefix: &str) {
        for cond in conditions {
            let row = format!(
                "{}{}{}{}{}{}{}",
                pad(prefix, OBJECT_COL_WIDTH),
                CELL_SEP,
                pad_keep_control(&self.format_condition_type(cond), CONDITION_COL_WIDTH),
                CELL_SEP,
                pad(
                    &format_time_since(cond.condition.last_transition_time),
                    AGE_COL_WIDTH
                ),
                CELL_SEP,
                cond.condition.reason,
            );
            out.push_str(row.trim_end());
            out.push('\n');

            if cond.status.result > Verdict::Ok || cond.status.progressing {
                self.render_condition_message(out, cond, prefix);
            }
        }
    }

    /// Message lines go on their own rows, indented under the condition
    /// column.
    fn render_condition_message(&self, out: &mut String, cond: &ConditionStatus, prefix: &str) {
        let message = match &cond.status.err {
            Some(err) if cond.condition.message.is_empty() => err.clone(),
            _ => cond.condition.message.clone(),
        };
        for line in message.lines().take(MAX_MESSAGE_LINES) {
            let row = format!("{}{}  {}", pad(prefix, OBJECT_COL_WIDTH), CELL_SEP, line);
            out.push_str(row.trim_end());
            out.push('\n');
        }
    }

    fn render_subtree(&self, out: &mut String, statuses: &[ObjectStatus], prefix: &str) {
        let mut sorted: Vec<&ObjectStatus> = statuses.iter().collect();
        sort_objects(&mut sorted);

        let last = sorted.len().saturating_sub(1);
        for (i, obj) in sorted.iter().enumerate() {
            let (head, mut tail) = if i < last {
                ("├─ ", "│  ".to_string())
            } else {
                ("└─ ", "   ".to_string())
            };

            if self.should_print_details(obj) && !obj.sub_statuses.is_empty() {
                // Extra level of indentation when there are subresources.
                tail.push_str("│ ");
            }

            self.render_object_with_conditions(
                out,
                obj,
                &format!("{prefix}{head}"),
                &format!("{prefix}{tail}"),
                false,
            );

            let next_prefix = if i < last { "│  " } else { "   " };
            if self.should_print_details(obj) {
                self.render_subtree(out, &obj.sub_statuses, &format!("{prefix}{next_prefix}"));
            }
        }
    }

    fn format_object(&self, obj: &ObjectStatus, root: bool) -> String {
        let status = self.format_status(&obj.status);
        let mut full_name = String::new();
        if root {
            full_name.push_str(obj.object.namespace());
            full_name.push('/');
        }
        full_name.push_str(&format!("{}/{}", obj.object.gvk().kind, obj.object.name()));
        if self.opts.show_group {
            full_name.push_str(&format!(" [{}]", obj.object.gvk().group));
        }

        format!("{status} {full_name}")
    }

    fn format_status(&self, status: &Status) -> String {
        let text = status_message(status);
        match (self.opts.color, status_color(status)) {
            (true, Some(color)) => format!("{color}{text}{RESET}"),
            _ => text,
        }
    }

    fn format_condition_type(&self, cond: &ConditionStatus) -> String {
        if self.opts.color {
            match status_color(&cond.status) {
                Some(color) => format!("{color}{}{RESET}", cond.condition.type_),
                None => cond.condition.type_.clone(),
            }
        } else {
            let mut ret = format!("{}={}", cond.condition.type_, cond.condition.status);
            if cond.status.result > Verdict::Ok {
                ret = format!("({}) {}", cond.status.result, ret);
            }
            ret
        }
    }
}

fn status_color(status: &Status) -> Option<&'static str> {
    if status.progressing {
        return Some(YELLOW);
    }

    match status.result {
        Verdict::Ok => Some(GREEN),
        Verdict::Warning => Some(YELLOW),
        Verdict::Error => Some(RED),
        Verdict::Unknown => None,
    }
}

fn status_message(status: &Status) -> String {
    if status.progressing {
        "Progressing".to_string()
    } else {
        status.result.to_string()
    }
}

fn format_time_since(t: Option<DateTime<Utc>>) -> String {
    let Some(t) = t else {
        return String::new();
    };
    let since = Utc::now() - t;

    if since.num_seconds() <= 90 {
        format!("{}s", since.num_seconds().max(0))
    } else if since.num_minutes() <= 90 {
        format!("{}m", since.num_minutes())
    } else {
        format!("{}h", since.num_hours())
    }
}

fn pad(s: &str, width: usize) -> String {
    format!("{s:<width$}")
}

/// Pad to a visible width, not counting ANSI color sequences.
fn pad_keep_control(s: &str, width: usize) -> String {
    let visible = visible_len(s);
    let missing = width.saturating_sub(visible);
    format!("{s}{}", " ".repeat(missing))
}

fn visible_len(s: &str) -> usize {
    let mut len = 0;
    let mut in_escape = false;
    for c in s.chars() {
        if in_escape {
            if c == 'm' {
                in_escape = false;
            }
        } else if c == '\x1b' {
            in_escape = true;
        } else {
            len += 1;
        }
    }
    len
}

fn sort_objects(objects: &mut [&ObjectStatus]) {
    objects.sort_by_key(|obj| {
        format!(
            "{} {} {}",
            obj.object.namespace(),
            obj.object.gvk().kind,
            obj.object.name()
        )
    });
}
