//! Outcome evaluation: status code patterns and response size drift

use std::collections::VecDeque;

use crate::check::CheckResult;
use crate::config::TargetConfig;

/// Whether `status_code` matches any of the accepted patterns.
///
/// Supported patterns: `"*"` (anything), `"2**"` (same first digit),
/// `"200-399"` (inclusive range) and exact codes. An empty pattern list
/// accepts every code.
pub fn is_allowed(status_code: u16, patterns: &[String]) -> bool {
    if patterns.is_empty() {
        return true;
    }
    let code = status_code.to_string();
    patterns
        .iter()
        .any(|pattern| pattern_matches(pattern.trim(), status_code, &code))
}

fn pattern_matches(pattern: &str, status_code: u16, code: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    if let Some(class) = pattern.strip_suffix("**") {
        if class.len() == 1 && class.chars().all(|c| c.is_ascii_digit()) {
            return code.starts_with(class);
        }
    }

    if let Some((low, high)) = pattern.split_once('-') {
        if let (Ok(low), Ok(high)) = (low.trim().parse::<u16>(), high.trim().parse::<u16>()) {
            return (low..=high).contains(&status_code);
        }
    }

    pattern == code
}

/// Record `new_size` and report whether it drifted from the recent average.
///
/// The history is trimmed from the front to `window` samples. The mean is
/// taken over every sample except the newest; a zero mean never drifts.
pub fn detect_size_drift(
    history: &mut VecDeque<u64>,
    new_size: u64,
    enabled: bool,
    window: usize,
    threshold: f64,
) -> bool {
    if !enabled {
        return false;
    }

    history.push_back(new_size);
    while history.len() > window.max(1) {
        history.pop_front();
    }

    match previous_mean(history) {
        Some(mean) if mean > 0.0 => {
            let change = (new_size as f64 - mean).abs() / mean;
            change >= threshold
        }
        _ => false,
    }
}

/// Mean of every sample except the newest, if at least two samples exist
pub fn previous_mean(history: &VecDeque<u64>) -> Option<f64> {
    if history.len() < 2 {
        return None;
    }
    let previous = history.len() - 1;
    let sum: u64 = history.iter().take(previous).sum();
    Some(sum as f64 / previous as f64)
}

/// Decide whether a raw check result counts as healthy for this target
pub fn evaluate(target: &TargetConfig, result: &CheckResult) -> bool {
    if !result.success {
        return false;
    }
    match result.status_code {
        Some(status) => is_allowed(status, &target.status_codes),
        None => true,
    }
}
