//! Demo application for the FlagSdk OpenFeature provider.
//!
//! Uses an in-process SDK with a fixed flag table, so it runs without network
//! access.
//!
//! ## Running
//!
//! ```bash
//! cargo run --example demo
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use open_feature::provider::FeatureProvider;
use open_feature::EvaluationContext;
use serde_json::{json, Value as JsonValue};

use flagsdk_openfeature_provider::{
    BackendError, EvaluationDetails, FlagClient, FlagSdk, FlagSdkProvider, FlagUser, ProviderConfig,
    SdkConfig,
};

// Configuration - replace with your actual values
const API_KEY: &str = "API_KEY";
const API_ENDPOINT: &str = "https://api.example.com";
const FLAG_KEY: &str = "checkout-banner";
const TARGETING_KEY: &str = "visitor-42";

struct DemoClient {
    user: Mutex<Option<FlagUser>>,
}

impl DemoClient {
    fn details<T>(&self, flag_key: &str, value: T, variation: &str) -> EvaluationDetails<T> {
        EvaluationDetails {
            feature_id: flag_key.to_string(),
            feature_version: 1,
            user_id: self
                .user
                .lock()
                .ok()
                .and_then(|u| u.as_ref().map(|u| u.id.clone()))
                .unwrap_or_default(),
            variation_id: format!("{}-{}", flag_key, variation),
            variation_name: variation.to_string(),
            variation_value: value,
            reason: "TARGET".to_string(),
        }
    }
}

impl FlagClient for DemoClient {
    fn bool_variation_details(&self, flag_key: &str, _default_value: bool) -> EvaluationDetails<bool> {
        self.details(flag_key, true, "enabled")
    }

    fn string_variation_details(&self, flag_key: &str, _default_value: &str) -> EvaluationDetails<String> {
        self.details(flag_key, "Free shipping today".to_string(), "copy-b")
    }

    fn number_variation_details(&self, flag_key: &str, _default_value: f64) -> EvaluationDetails<f64> {
        self.details(flag_key, 0.15, "discount-15")
    }

    fn object_variation_details(&self, flag_key: &str, _default_value: &JsonValue) -> EvaluationDetails<JsonValue> {
        self.details(flag_key, json!({"color": "teal", "position": "top"}), "layout-b")
    }

    fn current_user(&self) -> Option<FlagUser> {
        self.user.lock().ok().and_then(|u| u.clone())
    }

    fn update_user_attributes(&self, attributes: HashMap<String, String>) {
        if let Ok(mut user) = self.user.lock() {
            if let Some(user) = user.as_mut() {
                user.attributes = attributes;
            }
        }
    }
}

struct DemoSdk {
    client: Arc<DemoClient>,
}

#[async_trait]
impl FlagSdk for DemoSdk {
    async fn initialize(&self, config: &SdkConfig, user: FlagUser) -> Result<(), BackendError> {
        println!("SDK initialized with {:?}", config);
        if let Ok(mut current) = self.client.user.lock() {
            *current = Some(user);
        }
        Ok(())
    }

    fn destroy(&self) {
        println!("SDK destroyed");
    }

    fn client(&self) -> Option<Arc<dyn FlagClient>> {
        Some(Arc::clone(&self.client) as Arc<dyn FlagClient>)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging
    tracing_subscriber::fmt::init();

    println!("=== FlagSdk OpenFeature Provider Demo ===");
    println!();

    let sdk = Arc::new(DemoSdk {
        client: Arc::new(DemoClient {
            user: Mutex::new(None),
        }),
    });
    let config = ProviderConfig::new(API_KEY, API_ENDPOINT, "web", "1.0.0");
    let provider = FlagSdkProvider::new(config, sdk)?;
    let mut events = provider.subscribe();

    let context = EvaluationContext::default()
        .with_targeting_key(TARGETING_KEY)
        .with_custom_field("environment", "production");

    provider.initialize(Some(&context)).await?;
    let info = provider.metadata();
    println!("Provider {} {} is {:?}", info.name, info.version, provider.status());
    println!();

    println!("--- Boolean: {} ---", FLAG_KEY);
    let details = provider.resolve_bool_value(FLAG_KEY, &context).await;
    println!("  {:?}", details);

    println!("--- String: {} ---", FLAG_KEY);
    let resolution = provider.resolve_string_evaluation(FLAG_KEY, "", Some(&context))?;
    println!("  Value: {}", resolution.value);
    println!("  Variant: {:?}", resolution.variant);
    println!("  Reason: {:?}", resolution.reason);

    println!("--- Object: {} ---", FLAG_KEY);
    let resolution = provider.resolve_object_evaluation(FLAG_KEY, json!({}), Some(&context))?;
    println!("  Value: {}", resolution.value);
    println!();

    // Attribute changes are applied in place; a new targeting key is rejected.
    let updated = context.clone().with_custom_field("environment", "staging");
    provider.on_context_change(Some(&context), &updated).await?;
    let other_user = EvaluationContext::default().with_targeting_key("someone-else");
    if let Err(e) = provider.on_context_change(Some(&updated), &other_user).await {
        println!("Context change rejected: {}", e);
    }

    while let Ok(event) = events.try_recv() {
        println!("Event: {:?}", event);
    }

    provider.on_close();
    println!("Done!");

    Ok(())
}
