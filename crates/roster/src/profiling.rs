use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use fastrace::collector::{Reporter, SpanRecord};

pub struct CollectingReporter {
    spans: Arc<Mutex<Vec<SpanRecord>>>,
}

impl CollectingReporter {
    pub fn new() -> (Self, SpanCollector) {
        let spans = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                spans: spans.clone(),
            },
            SpanCollector { spans },
        )
    }
}

impl Reporter for CollectingReporter {
    fn report(&mut self, spans: Vec<SpanRecord>) {
        if let Ok(mut collected) = self.spans.lock() {
            collected.extend(spans);
        }
    }
}

pub struct SpanCollector {
    spans: Arc<Mutex<Vec<SpanRecord>>>,
}

impl SpanCollector {
    pub fn collect_and_aggregate(&self) -> Vec<FunctionStats> {
        let spans = match self.spans.lock() {
            Ok(mut spans) => std::mem::take(&mut *spans),
            Err(_) => return Vec::new(),
        };
        let timings: Vec<(String, u64)> = spans
            .iter()
            .map(|s| (simplify_name(&s.name), s.duration_ns))
            .collect();
        compute_function_stats(&timings)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionStats {
    pub name: String,
    pub calls: u32,
    pub total_us: u64,
    pub avg_us: u64,
    pub max_us: u64,
}

fn simplify_name(name: &str) -> String {
    let name = name
        .replace("::{{closure}}", "")
        .replace("roster_registry::", "")
        .replace("roster::", "");

    if let Some(pos) = name.rfind("::") {
        name[pos + 2..].to_string()
    } else {
        name
    }
}

/// Groups `(name, duration_ns)` pairs by name, slowest total first.
fn compute_function_stats(spans: &[(String, u64)]) -> Vec<FunctionStats> {
    let mut by_name: HashMap<&str, Vec<u64>> = HashMap::new();

    for (name, duration_ns) in spans {
        by_name.entry(name).or_default().push(duration_ns / 1000);
    }

    let mut stats: Vec<FunctionStats> = by_name
        .into_iter()
        .map(|(name, durations)| {
            let calls = durations.len() as u32;
            let total_us: u64 = durations.iter().sum();
            let avg_us = if calls > 0 { total_us / calls as u64 } else { 0 };
            let max_us = durations.iter().copied().max().unwrap_or(0);

            FunctionStats {
                name: name.to_string(),
                calls,
                total_us,
                avg_us,
                max_us,
            }
        })
        .collect();

    stats.sort_by(|a, b| b.total_us.cmp(&a.total_us).then_with(|| a.name.cmp(&b.name)));
    stats
}

pub fn format_function_stats(stats: &[FunctionStats]) -> String {
    let mut lines = vec![format!(
        "{:<28} {:>6} {:>10} {:>10} {:>10}",
        "FUNCTION", "CALLS", "TOTAL", "AVG", "MAX"
    )];
    for s in stats {
        lines.push(format!(
            "{:<28} {:>6} {:>8}us {:>8}us {:>8}us",
            s.name, s.calls, s.total_us, s.avg_us, s.max_us
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simplify_name() {
        assert_eq!(
            simplify_name("roster_registry::UserRegistry::find_users"),
            "find_users"
        );
        assert_eq!(simplify_name("command"), "command");
    }

    #[test]
    fn test_compute_function_stats() {
        let spans = vec![
            ("find_users".to_string(), 3_000),
            ("report_with_limit".to_string(), 10_000),
            ("find_users".to_string(), 5_000),
        ];
        let stats = compute_function_stats(&spans);
        assert_eq!(
            stats,
            vec![
                FunctionStats {
                    name: "report_with_limit".to_string(),
                    calls: 1,
                    total_us: 10,
                    avg_us: 10,
                    max_us: 10,
                },
                FunctionStats {
                    name: "find_users".to_string(),
                    calls: 2,
                    total_us: 8,
                    avg_us: 4,
                    max_us: 5,
                },
            ]
        );
    }

    #[test]
    fn test_format_function_stats() {
        let text = format_function_stats(&[FunctionStats {
            name: "find_users".to_string(),
            calls: 2,
            total_us: 8,
            avg_us: 4,
            max_us: 5,
        }]);
        assert!(text.starts_with("FUNCTION"));
        assert!(text.contains("find_users"));
        assert!(text.contains("8us"));
    }
}
