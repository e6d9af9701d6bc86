//! Image model catalogue summary.

use std::fmt::Write as _;

use serde_json::Value;

/// Assumed output size, in tokens, for token-priced models.
const TOKENS_PER_IMAGE: f64 = 1024.0;

/// Approximate cost of one generated image.
#[derive(Debug, Clone, PartialEq)]
pub struct CostEstimate {
    /// Display string, e.g. `$0.04` or `~$0.031`.
    pub display: String,
    /// How the estimate was derived.
    pub notes: String,
    /// USD value used for ordering; `None` when the model has no price.
    pub usd: Option<f64>,
}

fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn flat_cents(usd_cents: f64, notes: String) -> CostEstimate {
    let usd = usd_cents / 100.0;
    CostEstimate {
        display: format!("${usd:.2}"),
        notes,
        usd: Some(usd),
    }
}

/// Estimates the per-image cost of a model card.
#[must_use]
pub fn estimate_cost(model: &Value) -> CostEstimate {
    let endpoint = model.get("endpoint");
    let pricing = endpoint.and_then(|e| e.get("pricing"));
    let pricing_json = endpoint.and_then(|e| e.get("pricing_json"));
    let provider_price = |key: &str| pricing_json.and_then(|p| p.get(key)).filter(|v| !v.is_null());

    if let Some(v) = provider_price("sourceful:cents_per_image_output") {
        let cents = number(Some(v)).unwrap_or(0.0);
        return flat_cents(cents, format!("Sourceful: {cents}¢/image"));
    }
    if let Some(v) = provider_price("sourceful:cents_per_2k_image_output") {
        let cents = number(Some(v)).unwrap_or(0.0);
        return flat_cents(cents, format!("Sourceful 2K: {cents}¢"));
    }
    if let Some(v) = provider_price("bfl:informational_output_megapixels") {
        let usd = number(Some(v)).unwrap_or(0.0);
        return CostEstimate {
            display: format!("${usd:.3}"),
            notes: "BFL: first MP".to_string(),
            usd: Some(usd),
        };
    }
    if let Some(v) = provider_price("seedream:cents_per_image_output") {
        let cents = number(Some(v)).unwrap_or(0.0);
        return flat_cents(cents, "Seedream: flat rate".to_string());
    }

    let per_token = number(pricing.and_then(|p| p.get("image_output")))
        .or_else(|| number(pricing.and_then(|p| p.get("image_token"))));
    if let Some(per_token) = per_token.filter(|p| *p > 0.0) {
        let usd = per_token * TOKENS_PER_IMAGE;
        let display = if usd < 0.01 {
            format!("~${usd:.3}")
        } else {
            format!("~${usd:.2}")
        };
        return CostEstimate {
            display,
            notes: format!("~1024 tokens × ${per_token}/token"),
            usd: Some(usd),
        };
    }

    CostEstimate {
        display: "-".to_string(),
        notes: "no price in API".to_string(),
        usd: None,
    }
}

fn first_str<'a>(value: &'a Value, pointers: &[&str]) -> &'a str {
    pointers
        .iter()
        .find_map(|p| value.pointer(p).and_then(Value::as_str))
        .unwrap_or("")
}

fn image_output_price(model: &Value) -> String {
    ["/endpoint/pricing/image_output", "/endpoint/pricing/image_token"]
        .iter()
        .find_map(|p| model.pointer(p).filter(|v| !v.is_null()))
        .map_or_else(
            || "-".to_string(),
            |v| v.as_str().map_or_else(|| v.to_string(), str::to_string),
        )
}

/// Renders model cards as a markdown table ordered by estimated cost.
#[must_use]
pub fn render_models_table(models: &[Value]) -> String {
    let mut rows: Vec<(&Value, CostEstimate)> =
        models.iter().map(|m| (m, estimate_cost(m))).collect();
    rows.sort_by(|(_, a), (_, b)| {
        let a = a.usd.unwrap_or(f64::INFINITY);
        let b = b.usd.unwrap_or(f64::INFINITY);
        a.total_cmp(&b)
    });

    let mut out = String::from(
        "# OpenRouter image models (output_modalities=image)\n\n\
         Data fetched from the OpenRouter API.\n\n\
         | id | name | provider | image_output | cost/image (approx.) | notes |\n\
         |---|---|---|:---:|---:|---|\n",
    );
    for (model, cost) in rows {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} |",
            first_str(model, &["/permaslug", "/slug"]),
            first_str(model, &["/name", "/short_name"]),
            first_str(model, &["/endpoint/provider_display_name", "/author"]),
            image_output_price(model),
            cost.display,
            cost.notes,
        );
    }
    out
}
