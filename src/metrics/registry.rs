use std::collections::BTreeMap;

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;

use super::percentiles::{LatencySummary, HIST_HIGH, HIST_LOW, HIST_SIGFIG};

// ─── Public types ────────────────────────────────────────────────

/// In-process counters for HTTP traffic, accounts, purchases and auth.
///
/// Request handlers call the `record_*` methods, the exporter and the local
/// metrics endpoints call [`snapshot`](Self::snapshot). Each domain sits behind
/// its own lock so a snapshot never observes a domain half-updated.
pub struct MetricRegistry {
    http: Mutex<HttpState>,
    accounts: Mutex<AccountState>,
    purchases: Mutex<PurchaseMetrics>,
}

/// `http.*` domain.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpMetrics {
    pub total_requests: u64,
    pub requests_by_method: BTreeMap<String, u64>,
    pub requests_by_status: BTreeMap<String, u64>,
    pub total_latency: u64,
    pub latency: LatencySummary,
}

/// `user.*` domain. `active_users` is derived, never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMetrics {
    pub total_users: u64,
    pub active_users: u64,
    pub total_user_updates: u64,
}

/// `purchase.*` domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseMetrics {
    pub total_purchases: u64,
    pub successful_purchases: u64,
    pub failed_purchases: u64,
    pub total_latency: u64,
    pub total_price: f64,
    pub total_pizzas: u64,
}

/// `auth.*` domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthMetrics {
    pub total_logins: u64,
    pub total_logouts: u64,
    pub total_registrations: u64,
    pub failed_logins: u64,
}

/// Read-only copy of every registry domain, taken for one export cycle or
/// one local metrics request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrySnapshot {
    pub http: HttpMetrics,
    pub user: UserMetrics,
    pub purchase: PurchaseMetrics,
    pub auth: AuthMetrics,
}

// ─── Internal state ──────────────────────────────────────────────

struct HttpState {
    total_requests: u64,
    requests_by_method: BTreeMap<String, u64>,
    requests_by_status: BTreeMap<String, u64>,
    total_latency: u64,
    latency_hist: Option<Histogram<u64>>,
}

/// User and auth counters share a lock: registration bumps both domains and
/// the active-user gauge needs a consistent login/logout pair.
#[derive(Default)]
struct AccountState {
    total_users: u64,
    total_user_updates: u64,
    auth: AuthMetrics,
}

impl AccountState {
    fn active_users(&self) -> u64 {
        self.auth.total_logins.saturating_sub(self.auth.total_logouts)
    }
}

// ─── MetricRegistry impl ─────────────────────────────────────────

impl MetricRegistry {
    pub fn new() -> Self {
        Self {
            http: Mutex::new(HttpState::new()),
            accounts: Mutex::new(AccountState::default()),
            purchases: Mutex::new(PurchaseMetrics::default()),
        }
    }

    /// One completed HTTP request.
    pub fn record_http_request(&self, method: &str, status_code: u16, latency_ms: u64) {
        let status_class = status_class(status_code);
        let mut http = self.http.lock();
        http.total_requests += 1;
        *http.requests_by_method.entry(method.to_owned()).or_insert(0) += 1;
        *http.requests_by_status.entry(status_class).or_insert(0) += 1;
        http.total_latency = http.total_latency.saturating_add(latency_ms);
        if let Some(hist) = http.latency_hist.as_mut() {
            hist.saturating_record(latency_ms);
        }
    }

    /// One purchase attempt, successful or not.
    pub fn record_purchase(&self, success: bool, latency_ms: u64, price: f64, item_count: u64) {
        let mut p = self.purchases.lock();
        p.total_purchases += 1;
        if success {
            p.successful_purchases += 1;
        } else {
            p.failed_purchases += 1;
        }
        p.total_latency = p.total_latency.saturating_add(latency_ms);
        p.total_price += price;
        p.total_pizzas = p.total_pizzas.saturating_add(item_count);
    }

    pub fn record_login(&self, success: bool) {
        let mut acc = self.accounts.lock();
        if success {
            acc.auth.total_logins += 1;
        } else {
            acc.auth.failed_logins += 1;
        }
    }

    pub fn record_logout(&self) {
        self.accounts.lock().auth.total_logouts += 1;
    }

    pub fn record_registration(&self) {
        let mut acc = self.accounts.lock();
        acc.auth.total_registrations += 1;
        acc.total_users += 1;
    }

    pub fn record_user_update(&self) {
        self.accounts.lock().total_user_updates += 1;
    }

    /// Current `max(0, logins − logouts)`.
    pub fn active_users(&self) -> u64 {
        self.accounts.lock().active_users()
    }

    /// Produce a read-only snapshot. Locks are taken one domain at a time.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let http = self.http.lock().snapshot();
        let (user, auth) = {
            let acc = self.accounts.lock();
            let user = UserMetrics {
                total_users: acc.total_users,
                active_users: acc.active_users(),
                total_user_updates: acc.total_user_updates,
            };
            (user, acc.auth)
        };
        let purchase = *self.purchases.lock();

        RegistrySnapshot {
            http,
            user,
            purchase,
            auth,
        }
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Inner impl ──────────────────────────────────────────────────

impl HttpState {
    fn new() -> Self {
        Self {
            total_requests: 0,
            requests_by_method: BTreeMap::new(),
            requests_by_status: BTreeMap::new(),
            total_latency: 0,
            // Bounds are constants, creation can only fail on a bad range.
            latency_hist: Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
                .ok(),
        }
    }

    fn snapshot(&self) -> HttpMetrics {
        HttpMetrics {
            total_requests: self.total_requests,
            requests_by_method: self.requests_by_method.clone(),
            requests_by_status: self.requests_by_status.clone(),
            total_latency: self.total_latency,
            latency: self
                .latency_hist
                .as_ref()
                .map(LatencySummary::from_histogram)
                .unwrap_or_else(LatencySummary::empty),
        }
    }
}

/// `"2xx"`, `"4xx"`, … from a status code.
pub fn status_class(status_code: u16) -> String {
    format!("{}xx", status_code / 100)
}
