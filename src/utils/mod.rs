use serde_json::{json, Value};

pub mod billing;
pub mod id;
pub mod sse;
pub mod tokenizer;

pub use id::ID_GENERATOR;

/// OpenAI streams only report usage when the client asks for it; force the ask
/// so the ledger always has something to reconcile against.
pub fn process_stream_options(data: &mut Value) {
    let is_stream = data
        .get("stream")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !is_stream {
        return;
    }
    match data.get_mut("stream_options") {
        Some(stream_options) => {
            stream_options["include_usage"] = Value::Bool(true);
        }
        None => {
            data["stream_options"] = json!({ "include_usage": true });
        }
    }
}

/// Splits a comma-separated column value, dropping empties.
pub fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_options_forced_for_streaming_requests() {
        let mut data = json!({"model": "gpt-x", "stream": true});
        process_stream_options(&mut data);
        assert_eq!(data["stream_options"]["include_usage"], json!(true));

        let mut data = json!({"model": "gpt-x", "stream": true, "stream_options": {"include_usage": false}});
        process_stream_options(&mut data);
        assert_eq!(data["stream_options"]["include_usage"], json!(true));
    }

    #[test]
    fn stream_options_untouched_for_unary_requests() {
        let mut data = json!({"model": "gpt-x"});
        process_stream_options(&mut data);
        assert!(data.get("stream_options").is_none());
    }

    #[test]
    fn split_csv_trims_and_drops_empties() {
        assert_eq!(split_csv("a, b ,,c"), vec!["a", "b", "c"]);
        assert!(split_csv("").is_empty());
    }
}
