//! Tolerant JSON extraction from model output.
//!
//! Models wrap JSON in prose and markdown fences despite instructions; try
//! the cheap interpretations in order before giving up.

pub fn extract_json(input: &str) -> Option<serde_json::Value> {
    // 1. Direct parse
    if let Ok(val) = serde_json::from_str(input) {
        return Some(val);
    }
    let trimmed = input.trim();
    // 2. Extract from code fences
    if let Some(json_str) = extract_from_code_fence(trimmed) {
        if let Ok(val) = serde_json::from_str(json_str.trim()) {
            return Some(val);
        }
    }
    // 3. First { to last }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(val) = serde_json::from_str(&trimmed[start..=end]) {
                return Some(val);
            }
        }
    }
    // 4. Same for arrays
    if let (Some(start), Some(end)) = (trimmed.find('['), trimmed.rfind(']')) {
        if start < end {
            if let Ok(val) = serde_json::from_str(&trimmed[start..=end]) {
                return Some(val);
            }
        }
    }
    None
}

fn extract_from_code_fence(text: &str) -> Option<&str> {
    let fence_starts = ["```json\n", "```json\r\n", "```JSON\n", "```\n", "```\r\n"];
    for marker in &fence_starts {
        if let Some(start) = text.find(marker) {
            let content_start = start + marker.len();
            if let Some(end) = text[content_start..].find("```") {
                return Some(text[content_start..content_start + end].trim());
            }
        }
    }
    None
}
