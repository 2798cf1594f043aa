//! Error Presentation
//!
//! Human-readable text for failures that are folded into a
//! `completed_message` frame instead of being returned to the caller.

use crate::error::{ContentFilterResult, UpstreamFault};

/// Text for an upstream fault
#[must_use]
pub fn describe_fault(fault: &UpstreamFault) -> String {
    if let Some(filter) = &fault.content_filter {
        return describe_content_filter(filter);
    }
    match fault.status {
        Some(status) => format!("Upstream error ({status}): {}", fault.body),
        None => format!("Upstream connection failed: {}", fault.body),
    }
}

/// Text for a content-filter rejection, listing the triggered categories
#[must_use]
pub fn describe_content_filter(filter: &ContentFilterResult) -> String {
    let categories: Vec<String> = filter
        .triggered()
        .map(|(name, verdict)| match &verdict.severity {
            Some(severity) => format!("{name} (severity: {severity})"),
            None => name.to_string(),
        })
        .collect();

    format!(
        "The response was blocked by the content filter: {}",
        categories.join(", ")
    )
}

/// Text for an error the upstream signaled mid-stream
#[must_use]
pub fn describe_stream_error(detail: &str) -> String {
    format!("Upstream stream error: {detail}")
}
