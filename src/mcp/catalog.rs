//! The tool catalog fetched at connect time.
//!
//! Read-only for the life of a connection and dropped on disconnect. Also
//! renders itself as the prompt's `Available Tools` text: name,
//! description, and each declared parameter with a required marker.

use rust_mcp_schema::Tool;
use serde_json::Value;

const PARAM_DESCRIPTION_LIMIT: usize = 100;

pub struct ToolCatalog {
    tools: Vec<Tool>,
}

impl ToolCatalog {
    pub fn new(tools: Vec<Tool>) -> Self {
        ToolCatalog { tools }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.iter().any(|tool| tool.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|tool| tool.name.as_str())
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// One `name - description` line per tool, for `/tools` output and the
    /// `tools` subcommand.
    pub fn overview_lines(&self) -> Vec<String> {
        self.tools
            .iter()
            .map(|tool| {
                let description = tool.description.as_deref().unwrap_or("");
                format!("  {} - {}", tool.name, description)
            })
            .collect()
    }

    /// Render the catalog for the model: one `**name**: description` block
    /// per tool, parameters listed with `*` marking required fields and
    /// descriptions cut to a readable length.
    pub fn render_for_prompt(&self) -> String {
        let blocks: Vec<String> = self.tools.iter().map(render_tool).collect();
        blocks.join("\n\n")
    }
}

fn render_tool(tool: &Tool) -> String {
    let description = tool.description.as_deref().unwrap_or("");
    let mut block = format!("**{}**: {}", tool.name, description);

    let schema = match serde_json::to_value(&tool.input_schema) {
        Ok(value) => value,
        Err(_) => return block,
    };

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return block;
    };
    if properties.is_empty() {
        return block;
    }

    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    block.push_str("\nParameters:");
    for (name, info) in properties {
        let marker = if required.contains(&name.as_str()) {
            "*"
        } else {
            ""
        };
        let param_type = info
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("any");
        let description: String = info
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("")
            .chars()
            .take(PARAM_DESCRIPTION_LIMIT)
            .collect();
        block.push_str(&format!("\n  - {name}{marker} ({param_type}): {description}"));
    }

    block
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(value: serde_json::Value) -> Tool {
        serde_json::from_value(value).expect("tool should parse")
    }

    fn sample_catalog() -> ToolCatalog {
        ToolCatalog::new(vec![
            tool(serde_json::json!({
                "name": "geocode_address",
                "description": "Convert a street address into coordinates",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "address": {"type": "string", "description": "Street address to geocode"},
                        "country": {"type": "string", "description": "Optional ISO country code"}
                    },
                    "required": ["address"]
                }
            })),
            tool(serde_json::json!({
                "name": "list_drivers",
                "description": "List all drivers",
                "inputSchema": {"type": "object"}
            })),
        ])
    }

    #[test]
    fn lookup_by_name() {
        let catalog = sample_catalog();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.contains("geocode_address"));
        assert!(!catalog.contains("delete_everything"));
        assert!(catalog.get("list_drivers").is_some());
    }

    #[test]
    fn renders_parameters_with_required_markers() {
        let rendered = sample_catalog().render_for_prompt();

        assert!(rendered.contains("**geocode_address**: Convert a street address into coordinates"));
        assert!(rendered.contains("  - address* (string): Street address to geocode"));
        assert!(rendered.contains("  - country (string): Optional ISO country code"));
        // Tools without declared parameters render as a bare header line.
        assert!(rendered.contains("**list_drivers**: List all drivers"));
        assert!(!rendered.contains("list_drivers**: List all drivers\nParameters:"));
    }

    #[test]
    fn long_parameter_descriptions_are_cut() {
        let long = "x".repeat(300);
        let catalog = ToolCatalog::new(vec![tool(serde_json::json!({
            "name": "create_order",
            "description": "Create a delivery order",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "notes": {"type": "string", "description": long}
                }
            }
        }))]);

        let rendered = catalog.render_for_prompt();
        assert!(rendered.contains(&"x".repeat(PARAM_DESCRIPTION_LIMIT)));
        assert!(!rendered.contains(&"x".repeat(PARAM_DESCRIPTION_LIMIT + 1)));
    }

    #[test]
    fn missing_schema_fields_fall_back() {
        let catalog = ToolCatalog::new(vec![tool(serde_json::json!({
            "name": "route_eta",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "waypoints": {"description": "Ordered stops"}
                }
            }
        }))]);

        let rendered = catalog.render_for_prompt();
        assert!(rendered.contains("**route_eta**: "));
        assert!(rendered.contains("  - waypoints (any): Ordered stops"));
    }

    #[test]
    fn empty_catalog_renders_empty() {
        assert!(ToolCatalog::new(Vec::new()).render_for_prompt().is_empty());
    }

    #[test]
    fn overview_is_one_line_per_tool() {
        let overview = sample_catalog().overview_lines();
        assert_eq!(
            overview,
            vec![
                "  geocode_address - Convert a street address into coordinates".to_string(),
                "  list_drivers - List all drivers".to_string(),
            ]
        );
    }
}
