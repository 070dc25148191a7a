//! Built-in provider table.
//!
//! Pacing values follow the free-tier RPM budgets each vendor publishes;
//! costs are per 1k tokens in USD.

use super::{ApiStyle, Defaults, ModelConfig, ProviderConfig, RelayConfig};

pub(super) fn builtin() -> RelayConfig {
    let mut config = RelayConfig {
        defaults: Defaults::default(),
        provider_priority: ["gemini", "openai", "mistral", "anthropic", "ollama"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        ..Default::default()
    };

    config.providers.insert(
        "gemini".into(),
        ProviderConfig::new(
            ApiStyle::GeminiGenerate,
            "https://generativelanguage.googleapis.com",
        )
        .with_models(["gemini-2.0-flash", "gemini-2.0-flash-lite", "gemini-1.5-flash"])
        .with_api_key_env("GEMINI_API_KEY"),
    );
    config.providers.insert(
        "openai".into(),
        ProviderConfig::new(ApiStyle::OpenAiCompatible, "https://api.openai.com")
            .with_models(["gpt-4o-mini", "gpt-4o"])
            .with_api_key_env("OPENAI_API_KEY"),
    );
    config.providers.insert(
        "mistral".into(),
        ProviderConfig::new(ApiStyle::OpenAiCompatible, "https://api.mistral.ai")
            .with_models(["mistral-small-latest", "open-mistral-nemo"])
            .with_api_key_env("MISTRAL_API_KEY"),
    );
    config.providers.insert(
        "anthropic".into(),
        ProviderConfig::new(ApiStyle::AnthropicMessages, "https://api.anthropic.com")
            .with_models(["claude-3-5-haiku-latest"])
            .with_api_key_env("ANTHROPIC_API_KEY"),
    );
    config.providers.insert(
        "ollama".into(),
        ProviderConfig::new(ApiStyle::OllamaChat, "http://localhost:11434")
            .with_models(["llama3.1"])
            .local(),
    );

    let models = [
        ("gemini-2.0-flash", ModelConfig::default().with_requests_per_minute(15).with_costs(0.0001, 0.0004)),
        ("gemini-2.0-flash-lite", ModelConfig::default().with_requests_per_minute(30).with_costs(0.000075, 0.0003)),
        ("gemini-1.5-flash", ModelConfig::default().with_requests_per_minute(15).with_costs(0.000075, 0.0003)),
        ("gpt-4o-mini", ModelConfig::default().with_base_delay_ms(500).with_costs(0.00015, 0.0006)),
        ("gpt-4o", ModelConfig::default().with_base_delay_ms(500).with_costs(0.0025, 0.01)),
        ("mistral-small-latest", ModelConfig::default().with_base_delay_ms(1000).with_costs(0.0002, 0.0006)),
        ("open-mistral-nemo", ModelConfig::default().with_base_delay_ms(1000).with_costs(0.00015, 0.00015)),
        ("claude-3-5-haiku-latest", ModelConfig::default().with_requests_per_minute(50).with_costs(0.0008, 0.004)),
        ("llama3.1", ModelConfig::default().with_base_delay_ms(0)),
    ];
    for (id, model) in models {
        config.models.insert(id.to_string(), model);
    }

    config
}
