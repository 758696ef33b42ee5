use std::{collections::HashMap, fmt::Debug};

use log::*;

use crate::{
    db_types::{RouteStrategy, RouterRule},
    traits::{RouteInfo, RouteRequest, RouterError, RouterManagement},
};

/// `RouterApi` picks the channel account(s) a transaction should be executed through.
///
/// Routing is deterministic over the current configuration and never retries; the caller owns retry behavior,
/// guided by the returned [`RouteStrategy`]. Stale configuration is tolerated — the next call sees current state.
pub struct RouterApi<B> {
    db: B,
}

impl<B> Debug for RouterApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RouterApi")
    }
}

impl<B> RouterApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> RouterApi<B>
where B: RouterManagement
{
    /// Resolves a route for the request. Rules for `(merchant_id, trx_type)` are scanned in ascending priority;
    /// the first rule whose filters all pass wins and its target is resolved. When no rule matches, or the winning
    /// rule's target resolves to nothing, the result is empty.
    pub async fn route(&self, req: RouteRequest) -> Result<RouteInfo, RouterError> {
        let rules = self.db.fetch_active_rules(&req.merchant_id, req.trx_type).await?;
        let Some(rule) = rules.iter().find(|rule| rule_matches(rule, &req)) else {
            debug!("🧭️ No router rule matches request {} for merchant {}", req.req_id, req.merchant_id);
            return Ok(RouteInfo::empty());
        };
        let info = self.resolve_target(rule, &req).await?;
        debug!(
            "🧭️ Routed request {} (merchant {}, {}) to {} account(s) via rule #{}",
            req.req_id,
            req.merchant_id,
            req.trx_type,
            info.channel_accounts.len(),
            rule.id
        );
        Ok(info)
    }

    async fn resolve_target(&self, rule: &RouterRule, req: &RouteRequest) -> Result<RouteInfo, RouterError> {
        if let Some(account_id) = rule.channel_account_id.as_deref().filter(|s| !s.is_empty()) {
            let Some(account) = self.db.fetch_channel_account(account_id).await? else {
                warn!("🧭️ Rule #{} points at unknown channel account {account_id}", rule.id);
                return Ok(RouteInfo::empty());
            };
            if !account.active {
                return Ok(RouteInfo::empty());
            }
            let channel_codes = HashMap::from([(account.channel_account_id.clone(), account.channel_code)]);
            return Ok(RouteInfo {
                channel_accounts: vec![account.channel_account_id],
                strategy: RouteStrategy::Once,
                channel_codes,
            });
        }
        if let Some(channel_code) = rule.channel_code.as_deref().filter(|s| !s.is_empty()) {
            let Some(account) = self.db.fetch_account_for_channel_code(&req.merchant_id, channel_code).await? else {
                return Ok(RouteInfo::empty());
            };
            let channel_codes = HashMap::from([(account.channel_account_id.clone(), account.channel_code)]);
            return Ok(RouteInfo {
                channel_accounts: vec![account.channel_account_id],
                strategy: RouteStrategy::Once,
                channel_codes,
            });
        }
        if let Some(group_id) = rule.channel_group_id.as_deref().filter(|s| !s.is_empty()) {
            let strategy = self
                .db
                .fetch_channel_group(group_id)
                .await?
                .map(|g| g.strategy)
                .unwrap_or(RouteStrategy::All);
            let accounts = self.db.fetch_group_accounts(group_id).await?;
            let mut channel_accounts = Vec::new();
            let mut channel_codes = HashMap::new();
            for account in accounts.into_iter().filter(|a| a.active) {
                channel_codes.insert(account.channel_account_id.clone(), account.channel_code);
                channel_accounts.push(account.channel_account_id);
            }
            if channel_accounts.is_empty() {
                return Ok(RouteInfo::empty());
            }
            return Ok(RouteInfo { channel_accounts, strategy, channel_codes });
        }
        warn!("🧭️ Rule #{} has no routing target configured", rule.id);
        Ok(RouteInfo::empty())
    }
}

/// An unset or empty rule filter is a wildcard; `*` is accepted as an explicit wildcard.
fn is_wildcard(filter: Option<&str>) -> bool {
    filter.map_or(true, |f| f.is_empty() || f == "*")
}

fn string_filter_matches(filter: Option<&str>, value: Option<&str>) -> bool {
    if is_wildcard(filter) {
        return true;
    }
    match (filter, value) {
        (Some(f), Some(v)) => f == v,
        _ => false,
    }
}

fn rule_matches(rule: &RouterRule, req: &RouteRequest) -> bool {
    if !string_filter_matches(rule.currency.as_deref(), Some(&req.currency)) {
        return false;
    }
    if !string_filter_matches(rule.trx_method.as_deref(), req.trx_method.as_deref()) {
        return false;
    }
    if !string_filter_matches(rule.trx_mode.as_deref(), req.trx_mode.as_deref()) {
        return false;
    }
    if !string_filter_matches(rule.trx_app.as_deref(), req.trx_app.as_deref()) {
        return false;
    }
    if !string_filter_matches(rule.package.as_deref(), req.package.as_deref()) {
        return false;
    }
    if !string_filter_matches(rule.device_id.as_deref(), req.device_id.as_deref()) {
        return false;
    }
    if rule.min_amount.is_some() || rule.max_amount.is_some() {
        // A rule with amount bounds never matches a request that carries no amount.
        let Some(amount) = req.amount else { return false };
        if let Some(min) = rule.min_amount {
            if amount < min {
                return false;
            }
        }
        if let Some(max) = rule.max_amount {
            if amount > max {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use mpg_common::Money;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::db_types::TrxType;

    fn rule() -> RouterRule {
        RouterRule {
            id: 1,
            merchant_id: "M1".into(),
            trx_type: TrxType::Payin,
            priority: 10,
            currency: None,
            trx_method: None,
            trx_mode: None,
            trx_app: None,
            device_id: None,
            package: None,
            min_amount: None,
            max_amount: None,
            channel_account_id: None,
            channel_code: None,
            channel_group_id: None,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn request() -> RouteRequest {
        RouteRequest::new("M1", TrxType::Payin, "req-1", "USD")
    }

    #[test]
    fn empty_filters_are_wildcards() {
        let mut r = rule();
        assert!(rule_matches(&r, &request()));
        r.currency = Some(String::new());
        assert!(rule_matches(&r, &request()));
        r.currency = Some("*".into());
        assert!(rule_matches(&r, &request()));
        r.currency = Some("EUR".into());
        assert!(!rule_matches(&r, &request()));
    }

    #[test]
    fn amount_bounds_reject_absent_amounts() {
        let mut r = rule();
        r.min_amount = Some(Money::new(dec!(10)));
        assert!(!rule_matches(&r, &request()));
        assert!(rule_matches(&r, &request().with_amount(Money::new(dec!(10)))));
        assert!(!rule_matches(&r, &request().with_amount(Money::new(dec!(9.99)))));
        r.max_amount = Some(Money::new(dec!(100)));
        assert!(!rule_matches(&r, &request().with_amount(Money::new(dec!(100.01)))));
        assert!(rule_matches(&r, &request().with_amount(Money::new(dec!(100)))));
    }

    #[test]
    fn set_filters_require_request_values() {
        let mut r = rule();
        r.trx_method = Some("upi".into());
        assert!(!rule_matches(&r, &request()));
        assert!(rule_matches(&r, &request().with_method("upi")));
        assert!(!rule_matches(&r, &request().with_method("imps")));
    }
}
