// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `reqwest` implementation of the SCP directory.
//!
//! Each [`ServerDirectory`] method is one SOAP POST. No retries happen here:
//! a failed call aborts the reconciliation that issued it, and the controller
//! requeues.

use super::soap::{envelope, response_element, XmlElement};
use super::{Credentials, IpRoute, ServerDirectory, ServerInfo, ServerInterface};
use crate::errors::ScpError;
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

/// Longest response body kept in an [`ScpError::Http`] message
const MAX_ERROR_BODY_LEN: usize = 512;

/// Client for the SCP end-user web service.
#[derive(Debug, Clone)]
pub struct ScpClient {
    http: HttpClient,
    endpoint: Url,
    credentials: Credentials,
}

impl ScpClient {
    /// Create a client for the given endpoint.
    ///
    /// `timeout` bounds every request, so a hung web service cannot stall a
    /// reconciliation indefinitely.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: Url, credentials: Credentials, timeout: Duration) -> Result<Self, ScpError> {
        let http = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint,
            credentials,
        })
    }

    /// Endpoint this client posts to.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Issue one SOAP operation and return its response element.
    async fn call(&self, operation: &str, fields: &[(&str, &str)]) -> Result<XmlElement, ScpError> {
        let mut all_fields = vec![
            ("loginName", self.credentials.login.as_str()),
            ("password", self.credentials.password.as_str()),
        ];
        all_fields.extend_from_slice(fields);
        let body = envelope(operation, &all_fields);

        debug!(operation = %operation, endpoint = %self.endpoint, "SCP request");
        let start = Instant::now();

        let response = self
            .http
            .post(self.endpoint.clone())
            .header(reqwest::header::CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", "\"\"")
            .body(body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;

        debug!(
            operation = %operation,
            status = %status,
            elapsed = ?start.elapsed(),
            "SCP response"
        );

        // Faults arrive with HTTP 500, so the body is inspected before the status.
        match response_element(&text) {
            Ok(element) if status.is_success() => Ok(element),
            Err(fault @ ScpError::Fault { .. }) => {
                warn!(operation = %operation, error = %fault, "SCP fault");
                Err(fault)
            }
            Ok(_) | Err(_) if !status.is_success() => Err(ScpError::Http {
                status: status.as_u16(),
                body: text.chars().take(MAX_ERROR_BODY_LEN).collect(),
            }),
            other => other,
        }
    }
}

fn parse_interface(element: &XmlElement) -> ServerInterface {
    ServerInterface {
        mac: element.child_text("mac"),
        ipv4: element.child_texts("ipv4IP"),
        ipv6: element.child_texts("ipv6IP"),
    }
}

fn parse_server_info(response: &XmlElement) -> Result<ServerInfo, ScpError> {
    let info = response
        .child("return")
        .ok_or_else(|| ScpError::MalformedResponse("missing server information".to_string()))?;
    Ok(ServerInfo {
        name: info.child_text("vServerName"),
        status: info.child_text("status"),
        ips: info.child_texts("ips"),
        interfaces: info
            .children_named("serverInterfaces")
            .map(parse_interface)
            .collect(),
    })
}

#[async_trait]
impl ServerDirectory for ScpClient {
    async fn list_servers(&self) -> Result<Vec<String>, ScpError> {
        let response = self.call("getVServers", &[]).await?;
        Ok(response.child_texts("return"))
    }

    async fn server_state(&self, server: &str) -> Result<String, ScpError> {
        let response = self
            .call("getVServerState", &[("vserverName", server)])
            .await?;
        Ok(response.child_text("return"))
    }

    async fn server_info(&self, server: &str) -> Result<ServerInfo, ScpError> {
        let response = self
            .call("getVServerInformation", &[("vservername", server)])
            .await?;
        parse_server_info(&response)
    }

    async fn server_ips(&self, server: &str) -> Result<Vec<String>, ScpError> {
        let response = self
            .call("getVServerIPs", &[("vserverName", server)])
            .await?;
        Ok(response.child_texts("return"))
    }

    async fn route_ip(&self, route: &IpRoute) -> Result<bool, ScpError> {
        let address = route.address.to_string();
        let mask = route.prefix_len.to_string();
        let response = self
            .call(
                "changeIPRouting",
                &[
                    ("routedIP", address.as_str()),
                    ("routedMask", mask.as_str()),
                    ("destinationVserverName", route.server.as_str()),
                    ("destinationInterfaceMAC", route.interface_mac.as_str()),
                ],
            )
            .await?;
        Ok(response.child_text("return").trim() == "true")
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod client_tests;
