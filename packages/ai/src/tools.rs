//! Tool definitions exposed to the model.

use quake_map_conversation::GET_EARTHQUAKES;
use quake_map_quake_models::{
    DEFAULT_DAYS, DEFAULT_MIN_MAGNITUDE, MAX_DAYS, MIN_DAYS, MIN_MAGNITUDE_CEILING,
    MIN_MAGNITUDE_FLOOR, Region,
};

/// JSON schemas for every tool, in the provider-neutral
/// `{ name, description, parameters }` form.
#[must_use]
pub fn tool_definitions() -> Vec<serde_json::Value> {
    let regions: Vec<String> = Region::all().iter().map(ToString::to_string).collect();

    vec![serde_json::json!({
        "name": GET_EARTHQUAKES,
        "description": "Fetch recent earthquakes from the USGS feed. Call at most once per user message. The results are drawn on the user's map as colour-coded markers, and the region also selects the risk overlay.",
        "parameters": {
            "type": "object",
            "properties": {
                "minMagnitude": {
                    "type": "number",
                    "minimum": MIN_MAGNITUDE_FLOOR,
                    "maximum": MIN_MAGNITUDE_CEILING,
                    "description": format!("Minimum magnitude (default {DEFAULT_MIN_MAGNITUDE})")
                },
                "days": {
                    "type": "integer",
                    "minimum": MIN_DAYS,
                    "maximum": MAX_DAYS,
                    "description": format!("How many days back from today to search (default {DEFAULT_DAYS})")
                },
                "region": {
                    "type": "string",
                    "enum": regions,
                    "description": "Restrict to a region's bounding box. Omit for a worldwide query."
                }
            },
            "required": []
        }
    })]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn earthquake_tool_schema_lists_whitelisted_regions() {
        let tools = tool_definitions();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "getEarthquakes");

        let props = &tools[0]["parameters"]["properties"];
        assert_eq!(props["region"]["enum"], serde_json::json!(["california"]));
        assert_eq!(props["days"]["maximum"], 90);
        assert_eq!(props["minMagnitude"]["maximum"], 10.0);
    }
}
