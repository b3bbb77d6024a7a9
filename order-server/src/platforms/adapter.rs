//! Platform Order Adapter
//!
//! 每个外卖平台一个实现: 校验 webhook 签名、解析通知、把平台订单转换成内部
//! 行项目。目录匹配顺序: 存储的 external id → 模糊名称 → 未匹配 (记 warning)。

use std::collections::HashMap;

use axum::http::HeaderMap;
use serde_json::Value;
use shared::models::{
    DishLine, DishOption, DishTemplate, LineItem, OrderType, Platform, SelectedOption,
};
use sqlx::SqlitePool;

use super::error::PlatformError;
use crate::db::repository::catalog;
use crate::orders::money::{line_subtotal, money_eq, to_f64};

/// Minimum similarity for a fuzzy name match
const NAME_MATCH_THRESHOLD: f64 = 0.8;

/// Where the full order payload comes from
#[derive(Debug, Clone, PartialEq)]
pub enum OrderSource {
    /// Pushed in the webhook body
    Inline(Value),
    /// Must be fetched from this reference
    Fetch(String),
}

/// Decoded webhook notification
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    NewOrder {
        platform_store_id: String,
        platform_order_id: String,
        source: OrderSource,
    },
    Cancelled {
        platform_order_id: String,
        reason: Option<String>,
    },
    StatusUpdate {
        platform_order_id: String,
        status: String,
    },
    /// Event kinds this service does not act on
    Ignored(String),
}

/// Marketplace order in internal shape
#[derive(Debug, Clone)]
pub struct MappedOrder {
    pub platform_order_id: String,
    pub display_id: Option<String>,
    pub order_type: OrderType,
    pub guest_name: Option<String>,
    pub items: Vec<LineItem>,
    pub platform_status: Option<String>,
    /// Unmatched / mis-priced items
    pub warnings: Vec<String>,
}

pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Verify the webhook signature against the shared secret
    fn verify_signature(
        &self,
        secret: &str,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<(), PlatformError>;

    fn parse_notification(&self, body: &[u8]) -> Result<Notification, PlatformError>;

    /// `toInternalOrder`: money normalised to the store currency, items matched
    /// against the catalog
    fn to_internal_order(
        &self,
        payload: &Value,
        catalog: &CatalogIndex,
        currency_decimals: i32,
    ) -> Result<MappedOrder, PlatformError>;
}

// ── Catalog matching ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchedBy {
    ExternalId,
    Name,
}

/// Brand catalog indexed for marketplace matching
#[derive(Debug, Clone, Default)]
pub struct CatalogIndex {
    templates: Vec<DishTemplate>,
    options: Vec<DishOption>,
    template_by_external: HashMap<String, usize>,
    option_by_external: HashMap<String, usize>,
}

impl CatalogIndex {
    pub fn new(templates: Vec<DishTemplate>, options: Vec<DishOption>) -> Self {
        let template_by_external = templates
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.external_id.clone().map(|id| (id, i)))
            .collect();
        let option_by_external = options
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.external_id.clone().map(|id| (id, i)))
            .collect();
        Self {
            templates,
            options,
            template_by_external,
            option_by_external,
        }
    }

    /// Active catalog of a brand
    pub async fn load(pool: &SqlitePool, brand_id: i64) -> Result<Self, PlatformError> {
        let templates = catalog::find_templates_by_brand(pool, brand_id).await?;
        let options = catalog::find_options_by_brand(pool, brand_id).await?;
        Ok(Self::new(templates, options))
    }

    pub fn match_template(
        &self,
        external_id: Option<&str>,
        name: &str,
    ) -> Option<(&DishTemplate, MatchedBy)> {
        if let Some(i) = external_id.and_then(|id| self.template_by_external.get(id)) {
            return Some((&self.templates[*i], MatchedBy::ExternalId));
        }
        best_by_name(&self.templates, name, |t| t.name.as_str()).map(|t| (t, MatchedBy::Name))
    }

    pub fn match_option(
        &self,
        external_id: Option<&str>,
        name: &str,
    ) -> Option<(&DishOption, MatchedBy)> {
        if let Some(i) = external_id.and_then(|id| self.option_by_external.get(id)) {
            return Some((&self.options[*i], MatchedBy::ExternalId));
        }
        best_by_name(&self.options, name, |o| o.name.as_str()).map(|o| (o, MatchedBy::Name))
    }
}

fn best_by_name<'a, T>(candidates: &'a [T], name: &str, get: impl Fn(&T) -> &str) -> Option<&'a T> {
    let wanted = normalize_name(name);
    if wanted.is_empty() {
        return None;
    }
    let mut best: Option<(&T, f64)> = None;
    for candidate in candidates {
        let score = similarity(&wanted, &normalize_name(get(candidate)));
        if score >= NAME_MATCH_THRESHOLD && best.is_none_or(|(_, s)| score > s) {
            best = Some((candidate, score));
        }
    }
    best.map(|(c, _)| c)
}

/// Lowercase, alphanumerics only (CJK kept)
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// `1 − levenshtein / max_len` over chars
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 1.0;
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            cur[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    1.0 - prev[b.len()] as f64 / max_len as f64
}

// ── Line building shared by the adapters ────────────────────────────

/// Marketplace option, money already normalised
#[derive(Debug, Clone)]
pub struct ExternalOption {
    pub external_id: Option<String>,
    pub name: String,
    pub price: f64,
}

/// Marketplace line, money already normalised
#[derive(Debug, Clone)]
pub struct ExternalLine {
    pub external_id: Option<String>,
    pub name: String,
    pub unit_price: f64,
    pub quantity: i32,
    pub options: Vec<ExternalOption>,
    pub note: Option<String>,
}

/// Match one marketplace line against the catalog. Marketplace prices are
/// kept (that is what the customer paid); mismatches are reported.
pub fn build_dish_line(
    line: ExternalLine,
    catalog: &CatalogIndex,
    warnings: &mut Vec<String>,
) -> LineItem {
    let matched = catalog.match_template(line.external_id.as_deref(), &line.name);
    match matched {
        Some((template, by)) => {
            if by == MatchedBy::Name {
                tracing::debug!(name = %line.name, template_id = template.id, "Matched by name");
            }
            if !money_eq(template.price, line.unit_price) {
                warnings.push(format!(
                    "'{}' priced {} on the marketplace, {} in the catalog",
                    line.name, line.unit_price, template.price
                ));
            }
        }
        None => warnings.push(format!("'{}' not matched to the catalog", line.name)),
    }

    let mut options = Vec::with_capacity(line.options.len());
    for option in line.options {
        let found = catalog.match_option(option.external_id.as_deref(), &option.name);
        if found.is_none() {
            warnings.push(format!(
                "option '{}' on '{}' not matched to the catalog",
                option.name, line.name
            ));
        }
        options.push(SelectedOption {
            option_id: found.map(|(o, _)| o.id),
            name: option.name,
            price_modifier: option.price,
            bound_template_id: found.and_then(|(o, _)| o.bound_template_id),
        });
    }

    let subtotal = line_subtotal(
        line.unit_price,
        options.iter().map(|o| o.price_modifier),
        line.quantity,
    );
    LineItem::Dish(DishLine {
        template_id: matched.map(|(t, _)| t.id),
        name: line.name,
        unit_price: line.unit_price,
        quantity: line.quantity,
        options,
        subtotal: to_f64(subtotal),
        note: line.note,
        external_id: line.external_id,
    })
}

/// Required string field
pub fn str_field<'a>(value: &'a Value, pointer: &str) -> Result<&'a str, PlatformError> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .ok_or_else(|| PlatformError::payload(format!("missing field {pointer}")))
}

pub fn opt_str(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
