use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use chatwire::config::Config;
use chatwire::provider::{ProviderId, ProviderRegistry};

use crate::error::CliResult;
use crate::output::OutputFormat;

#[derive(Parser)]
pub struct ProvidersCommand {
    #[clap(long, help = "Only show enabled providers with an API key available")]
    pub ready: bool,
}

/// One row of the providers listing
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProviderRow {
    pub id: ProviderId,
    pub enabled: bool,
    pub model: String,
    pub models: Vec<String>,
    pub base_url: String,
    pub api_key_env: Option<String>,
    pub has_api_key: bool,
    pub streaming: bool,
    pub attachments: bool,
    pub function_calling: bool,
}

impl ProvidersCommand {
    pub fn execute(&self, config: &Config, format: OutputFormat) -> CliResult<()> {
        let mut rows = provider_rows(config)?;
        if self.ready {
            // Ollama runs keyless, so it always counts as ready
            rows.retain(|r| r.enabled && (r.has_api_key || r.api_key_env.is_none()));
        }

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            }
            OutputFormat::Table => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header([
                        "Provider",
                        "Enabled",
                        "Model",
                        "Models",
                        "Base URL",
                        "API Key",
                        "Capabilities",
                    ]);

                for row in &rows {
                    let key = match (&row.api_key_env, row.has_api_key) {
                        (_, true) => "set".to_string(),
                        (Some(var), false) => format!("missing (${var})"),
                        (None, false) => "not required".to_string(),
                    };
                    let mut capabilities = Vec::new();
                    if row.streaming {
                        capabilities.push("streaming");
                    }
                    if row.attachments {
                        capabilities.push("attachments");
                    }
                    if row.function_calling {
                        capabilities.push("functions");
                    }

                    table.add_row([
                        row.id.to_string(),
                        if row.enabled { "yes" } else { "no" }.to_string(),
                        row.model.clone(),
                        row.models.join(", "),
                        row.base_url.clone(),
                        key,
                        capabilities.join(", "),
                    ]);
                }

                println!("{table}");
            }
        }

        Ok(())
    }
}

/// Resolved settings and capabilities for every registered provider
pub fn provider_rows(config: &Config) -> CliResult<Vec<ProviderRow>> {
    let registry = ProviderRegistry::with_defaults();
    let mut rows = Vec::new();

    for id in registry.ids() {
        let capabilities = registry.get(id)?.capabilities();
        let resolved = config.resolve_provider(id)?;
        rows.push(ProviderRow {
            id,
            enabled: resolved.enabled,
            model: config.chat_options(id).model,
            models: config.models(id),
            base_url: resolved.base_url,
            api_key_env: config.api_key_env(id),
            has_api_key: resolved.api_key.is_some(),
            streaming: capabilities.streaming,
            attachments: capabilities.attachments,
            function_calling: capabilities.function_calling,
        });
    }

    Ok(rows)
}
