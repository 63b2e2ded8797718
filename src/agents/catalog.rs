//! Built-in agent catalog.
//!
//! The four agents a stock assistant ships with. Used when the config file
//! declares no agents of its own.

use super::types::AgentDescriptor;

pub const DOCUMENTATION: &str = "documentation";
pub const SEARCH: &str = "search";
pub const DESKTOP: &str = "desktop";
pub const DATA: &str = "data";

/// Descriptors for the default agent set, in routing-prompt order.
pub fn default_agents() -> Vec<AgentDescriptor> {
    vec![
        AgentDescriptor::new(
            DOCUMENTATION,
            "Library and framework documentation, API references and code examples",
            [
                "library documentation",
                "api reference",
                "code examples",
                "programming tutorials",
                "framework guides",
                "sdk usage",
            ],
        ),
        AgentDescriptor::new(
            SEARCH,
            "Web search for current events, facts and general knowledge",
            [
                "web search",
                "current events",
                "general knowledge",
                "facts",
                "latest information",
                "news",
                "research papers",
            ],
        ),
        AgentDescriptor::new(
            DESKTOP,
            "File system operations, shell commands and local applications",
            [
                "file operations",
                "system commands",
                "local applications",
                "file search",
                "directory listing",
                "file editing",
            ],
        ),
        AgentDescriptor::new(
            DATA,
            "Database queries, spreadsheets and structured data analysis",
            [
                "database queries",
                "data analysis",
                "spreadsheets",
                "data visualization",
                "data extraction",
                "structured data",
            ],
        ),
    ]
}
