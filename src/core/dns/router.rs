// src/core/dns/router.rs

//! Client for mc-router's route API.

use crate::core::errors::McAdminError;
use futures::future::try_join_all;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

/// `server address → backend` as mc-router stores them.
pub type Routes = HashMap<String, String>;

/// What would change if the target routes were pushed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteDiff {
    pub to_add: Routes,
    pub to_remove: Vec<String>,
    /// Routes whose backend differs.
    pub to_update: Routes,
}

impl RouteDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty() && self.to_update.is_empty()
    }
}

pub fn diff_routes(current: &Routes, target: &Routes) -> RouteDiff {
    let mut diff = RouteDiff::default();
    for (address, backend) in target {
        match current.get(address) {
            None => {
                diff.to_add.insert(address.clone(), backend.clone());
            }
            Some(existing) if existing != backend => {
                diff.to_update.insert(address.clone(), backend.clone());
            }
            Some(_) => {}
        }
    }
    for address in current.keys() {
        if !target.contains_key(address) {
            diff.to_remove.push(address.clone());
        }
    }
    diff.to_remove.sort();
    diff
}

pub struct McRouterClient {
    base_url: String,
    http: reqwest::Client,
}

impl McRouterClient {
    pub fn new(base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            base_url,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }

    pub async fn get_routes(&self) -> Result<Routes, McAdminError> {
        let response = self
            .http
            .get(format!("{}/routes", self.base_url))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| McAdminError::Router(format!("failed to fetch routes: {e}")))?;
        response
            .json()
            .await
            .map_err(|e| McAdminError::Router(format!("invalid routes response: {e}")))
    }

    async fn add_route(&self, server_address: &str, backend: &str) -> Result<(), McAdminError> {
        self.http
            .post(format!("{}/routes", self.base_url))
            .json(&json!({ "serverAddress": server_address, "backend": backend }))
            .send()
            .await
            .map_err(|e| McAdminError::Router(format!("failed to add route: {e}")))?;
        Ok(())
    }

    async fn remove_route(&self, server_address: &str) -> Result<(), McAdminError> {
        self.http
            .delete(format!("{}/routes/{server_address}", self.base_url))
            .send()
            .await
            .map_err(|e| McAdminError::Router(format!("failed to remove route: {e}")))?;
        Ok(())
    }

    /// Replaces the full route set: remove everything, then add the target.
    pub async fn override_routes(&self, routes: &Routes) -> Result<(), McAdminError> {
        let current = self.get_routes().await?;
        try_join_all(current.keys().map(|address| self.remove_route(address))).await?;
        if !routes.is_empty() {
            info!("Pushing {} routes to mc-router", routes.len());
            try_join_all(
                routes
                    .iter()
                    .map(|(address, backend)| self.add_route(address, backend)),
            )
            .await?;
        }
        Ok(())
    }

    /// What `override_routes` would change, for the status API.
    pub async fn get_routes_diff(&self, target: &Routes) -> Result<RouteDiff, McAdminError> {
        let current = self.get_routes().await?;
        Ok(diff_routes(&current, target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routes(pairs: &[(&str, &str)]) -> Routes {
        pairs
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect()
    }

    #[test]
    fn diff_detects_add_remove_update() {
        let current = routes(&[
            ("survival.mc.ex.com", "localhost:25565"),
            ("old.mc.ex.com", "localhost:25570"),
        ]);
        let target = routes(&[
            ("survival.mc.ex.com", "localhost:25566"),
            ("creative.mc.ex.com", "localhost:25567"),
        ]);
        let diff = diff_routes(&current, &target);
        assert_eq!(diff.to_remove, vec!["old.mc.ex.com".to_string()]);
        assert_eq!(diff.to_add.len(), 1);
        assert_eq!(
            diff.to_update.get("survival.mc.ex.com").map(String::as_str),
            Some("localhost:25566")
        );
    }

    #[test]
    fn identical_routes_are_empty_diff() {
        let current = routes(&[("survival.mc.ex.com", "localhost:25565")]);
        assert!(diff_routes(&current, &current.clone()).is_empty());
    }
}
