//! Response labels and dashboard links returned to the platform.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use keb_core::Plan;
use keb_state::Instance;
use tracing::{error, info};

use crate::queue::ApiServerUrls;

pub const NAME_KEY: &str = "Name";
pub const KUBECONFIG_URL_KEY: &str = "KubeconfigURL";
pub const API_SERVER_URL_KEY: &str = "APIServerURL";

const TRIAL_EXPIRY_DETAILS_KEY: &str = "Trial account expiration details";
const TRIAL_DOCS_KEY: &str = "Trial account documentation";
const TRIAL_EXPIRED_INFO: &str = "Your cluster has expired. It is not operational and the link to Kyma dashboard is no longer valid. \
     To continue using Kyma, you must create a new cluster. To learn how, follow the link to the trial account documentation.";
const TRIAL_LIFETIME_DAYS: i64 = 14;

const FREE_EXPIRY_DETAILS_KEY: &str = "Free plan expiration details";
const FREE_DOCS_KEY: &str = "Available plans documentation";
const FREE_EXPIRED_INFO: &str = "Your cluster has expired. It is not operational, and the link to Kyma dashboard is no longer valid. \
     To continue using Kyma, you must use a paid service plan. To learn more about the available plans, follow the link to the documentation.";
const FREE_LIFETIME_DAYS: i64 = 30;

/// Dashboard link of an instance.
pub fn dashboard_url(landscape_url: &str, plan_id: &str, instance_id: &str) -> String {
    if plan_id == Plan::OwnCluster.id() {
        landscape_url.to_string()
    } else {
        format!("{landscape_url}/?kubeconfigID={instance_id}")
    }
}

struct Expiry {
    lifetime: Duration,
    details_key: &'static str,
    docs_key: &'static str,
    docs_url: String,
    expired_info: &'static str,
}

/// Builds the label map attached to provision and update responses.
pub struct ResponseLabels {
    broker_host: String,
    trial: Expiry,
    free: Expiry,
    server_urls: Option<Arc<dyn ApiServerUrls>>,
}

impl ResponseLabels {
    pub fn new(broker_url: &str, trial_docs_url: &str, free_docs_url: &str) -> Self {
        let broker_host = broker_url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_string();
        Self {
            broker_host,
            trial: Expiry {
                lifetime: Duration::days(TRIAL_LIFETIME_DAYS),
                details_key: TRIAL_EXPIRY_DETAILS_KEY,
                docs_key: TRIAL_DOCS_KEY,
                docs_url: trial_docs_url.to_string(),
                expired_info: TRIAL_EXPIRED_INFO,
            },
            free: Expiry {
                lifetime: Duration::days(FREE_LIFETIME_DAYS),
                details_key: FREE_EXPIRY_DETAILS_KEY,
                docs_key: FREE_DOCS_KEY,
                docs_url: free_docs_url.to_string(),
                expired_info: FREE_EXPIRED_INFO,
            },
            server_urls: None,
        }
    }

    pub fn with_server_urls(mut self, server_urls: Arc<dyn ApiServerUrls>) -> Self {
        self.server_urls = Some(server_urls);
        self
    }

    pub fn labels(&self, instance: &Instance) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert(NAME_KEY.to_string(), instance.parameters.parameters.name.clone());

        if instance.service_plan_id != Plan::OwnCluster.id() && !instance.runtime_id.is_empty() {
            labels.insert(
                KUBECONFIG_URL_KEY.to_string(),
                format!("https://{}/kubeconfig/{}", self.broker_host, instance.instance_id),
            );
            if let Some(server_urls) = &self.server_urls {
                match server_urls.server_url(&instance.runtime_id) {
                    Ok(Some(url)) if !url.is_empty() => {
                        labels.insert(API_SERVER_URL_KEY.to_string(), url);
                    }
                    Ok(_) => info!(runtime = %instance.runtime_id, "API server URL not known yet"),
                    Err(e) => error!(runtime = %instance.runtime_id, error = %e, "while getting APIServerURL"),
                }
            }
        }

        let expiry = if instance.service_plan_id == Plan::Trial.id() {
            Some(&self.trial)
        } else if instance.service_plan_id == Plan::Free.id() {
            Some(&self.free)
        } else {
            None
        };
        if let Some(expiry) = expiry {
            add_expiry(&mut labels, instance, expiry);
        }
        labels
    }
}

fn add_expiry(labels: &mut BTreeMap<String, String>, instance: &Instance, expiry: &Expiry) {
    if instance.is_expired() {
        labels.remove(KUBECONFIG_URL_KEY);
        labels.remove(API_SERVER_URL_KEY);
        labels.insert(expiry.details_key.to_string(), expiry.expired_info.to_string());
        labels.insert(expiry.docs_key.to_string(), expiry.docs_url.clone());
        return;
    }
    let left = instance.created_at + expiry.lifetime - Utc::now();
    // Rounded to whole hours, then to whole days.
    let hours_left = ((left.num_minutes() as f64) / 60.0).round().max(0.0);
    let days_left = (hours_left / 24.0).round() as i64;
    let when = match days_left {
        0 => "today".to_string(),
        1 => "tomorrow".to_string(),
        n => format!("in {n:2} days"),
    };
    labels.insert(expiry.details_key.to_string(), format!("Your cluster expires {when}."));
}
