//! Shared script materialization for subprocess and remote backends.
//!
//! Every non-local backend runs the same self-contained script shape: the
//! component's source listing, the inlined encoded inputs, a call expanding
//! `args`/`kwargs`, and the result printed as one JSON line on standard
//! output. Drivers deliver the script; output interpretation stops at
//! extracting that final JSON line.

use crate::traits::{EncodedInputs, FunctionDescriptor};

/// Build the Python execution script for a component dispatch.
pub fn python_script(descriptor: &FunctionDescriptor, inputs: &EncodedInputs) -> String {
    let payload = python_string_literal(&inputs.to_payload().to_string());
    format!(
        "import json\n\
         import sys\n\
         \n\
         {source}\n\
         \n\
         input_data = json.loads({payload})\n\
         try:\n\
         \x20   result = {name}(*input_data[\"args\"], **input_data[\"kwargs\"])\n\
         \x20   if hasattr(result, '_asdict'):\n\
         \x20       result = result._asdict()\n\
         \x20   print(json.dumps(result))\n\
         except Exception as e:\n\
         \x20   print(json.dumps({{'error': str(e)}}), file=sys.stderr)\n\
         \x20   sys.exit(1)\n",
        source = descriptor.source_listing,
        name = descriptor.name,
        payload = payload,
    )
}

/// Escape arbitrary text into a single-quoted Python string literal.
pub fn python_string_literal(text: &str) -> String {
    let mut literal = String::with_capacity(text.len() + 2);
    literal.push('\'');
    for ch in text.chars() {
        match ch {
            '\\' => literal.push_str("\\\\"),
            '\'' => literal.push_str("\\'"),
            '\n' => literal.push_str("\\n"),
            '\r' => literal.push_str("\\r"),
            other => literal.push(other),
        }
    }
    literal.push('\'');
    literal
}

/// Pull the result out of captured output: the last non-empty line must be
/// JSON. Everything before it is the component's own logging.
pub fn extract_json_line(output: &str) -> Result<serde_json::Value, String> {
    let line = output
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| "no output produced".to_string())?;

    serde_json::from_str(line.trim())
        .map_err(|e| format!("final output line is not JSON ({}): {}", e, line.trim()))
}
