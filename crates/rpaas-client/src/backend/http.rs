//! HTTP backend.
//!
//! Talks to the RPaaS API either through the tsuru service proxy
//! (`{tsuru}/services/{service}/proxy/{instance}?callback={path}`, bearer
//! token) or directly against the RPaaS API when tsuru is bypassed.

use crate::backend::Backend;
use crate::config::{ClientConfig, Target};
use crate::error::{Error, Result};
use crate::types::{
    AclEntry, Autoscale, Block, BlockList, CertManager, ExtraFile, Instance, InstanceInfo, Route,
    RouteList, UpdateCertificate,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use ureq::tls::TlsConfig;

const USER_AGENT: &str = concat!("rpaas-client/", env!("CARGO_PKG_VERSION"));

/// Blocking HTTP backend.
pub struct HttpBackend {
    agent: ureq::Agent,
    target: Target,
}

enum WriteMethod {
    Post,
    Put,
}

impl HttpBackend {
    /// Create a backend from an explicit configuration.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;

        let agent_config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(config.timeout))
            .tls_config(
                TlsConfig::builder()
                    .disable_verification(config.skip_cert_verification)
                    .build(),
            )
            .build();

        if config.skip_cert_verification {
            log::warn!("TLS certificate verification is disabled");
        }

        Ok(Self {
            agent: ureq::Agent::new_with_config(agent_config),
            target: config.target.clone(),
        })
    }

    fn url(&self, at: &Instance, path: &str) -> String {
        match &self.target {
            Target::Tsuru { host, .. } => format!(
                "{}/services/{}/proxy/{}",
                host.trim_end_matches('/'),
                at.service,
                at.name
            ),
            Target::Direct { url } => format!("{}{path}", url.trim_end_matches('/')),
        }
    }

    fn decorate<B>(
        &self,
        request: ureq::RequestBuilder<B>,
        path: &str,
        query: &[(&str, &str)],
    ) -> ureq::RequestBuilder<B> {
        let mut request = request
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT);
        if let Target::Tsuru { token, .. } = &self.target {
            request = request
                .header("Authorization", format!("bearer {token}"))
                .query("callback", path);
        }
        for (key, value) in query {
            request = request.query(*key, *value);
        }
        request
    }

    fn get<T: DeserializeOwned>(&self, at: &Instance, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = self.url(at, path);
        log::debug!("GET {url} ({path})");
        let request = self.decorate(self.agent.get(&url), path, query);
        let body = read(request.call()?)?;
        Ok(serde_json::from_str(&body)?)
    }

    fn write<T: Serialize + ?Sized>(&self, method: WriteMethod, at: &Instance, path: &str, body: &T) -> Result<()> {
        let url = self.url(at, path);
        let request = match method {
            WriteMethod::Post => {
                log::debug!("POST {url} ({path})");
                self.agent.post(&url)
            }
            WriteMethod::Put => {
                log::debug!("PUT {url} ({path})");
                self.agent.put(&url)
            }
        };
        let request = self.decorate(request, path, &[]);
        read(request.send_json(body)?)?;
        Ok(())
    }

    fn delete(&self, at: &Instance, path: &str, query: &[(&str, &str)]) -> Result<()> {
        let url = self.url(at, path);
        log::debug!("DELETE {url} ({path})");
        let request = self.decorate(self.agent.delete(&url), path, query);
        read(request.call()?)?;
        Ok(())
    }
}

fn resource(at: &Instance, tail: &str) -> String {
    format!("/resources/{}/{tail}", at.name)
}

/// Body of a successful response, or the status error carrying the body.
fn read(mut response: ureq::http::Response<ureq::Body>) -> Result<String> {
    let status = response.status().as_u16();
    if !(200..300).contains(&status) {
        let body = response.body_mut().read_to_string().unwrap_or_default();
        return Err(Error::status(status, body));
    }
    Ok(response.body_mut().read_to_string()?)
}

impl Backend for HttpBackend {
    fn list_routes(&self, at: &Instance) -> Result<Vec<Route>> {
        let list: RouteList = self.get(at, &resource(at, "route"), &[])?;
        Ok(list.paths)
    }

    fn update_route(&self, at: &Instance, route: &Route) -> Result<()> {
        self.write(WriteMethod::Post, at, &resource(at, "route"), route)
    }

    fn delete_route(&self, at: &Instance, path: &str) -> Result<()> {
        self.delete(at, &resource(at, "route"), &[("path", path)])
    }

    fn list_blocks(&self, at: &Instance) -> Result<Vec<Block>> {
        let list: BlockList = self.get(at, &resource(at, "block"), &[])?;
        Ok(list.blocks)
    }

    fn update_block(&self, at: &Instance, block: &Block) -> Result<()> {
        self.write(WriteMethod::Post, at, &resource(at, "block"), block)
    }

    fn delete_block(&self, at: &Instance, server_name: &str, name: &str) -> Result<()> {
        let path = resource(at, &format!("block/{name}"));
        if server_name.is_empty() {
            self.delete(at, &path, &[])
        } else {
            self.delete(at, &path, &[("server_name", server_name)])
        }
    }

    fn list_acls(&self, at: &Instance) -> Result<Vec<AclEntry>> {
        self.get(at, &resource(at, "acl"), &[])
    }

    fn add_acl(&self, at: &Instance, entry: &AclEntry) -> Result<()> {
        self.write(WriteMethod::Post, at, &resource(at, "acl"), entry)
    }

    fn remove_acl(&self, at: &Instance, entry: &AclEntry) -> Result<()> {
        let port = entry.port.to_string();
        self.delete(
            at,
            &resource(at, "acl"),
            &[("host", entry.host.as_str()), ("port", port.as_str())],
        )
    }

    fn info(&self, at: &Instance) -> Result<InstanceInfo> {
        self.get(at, &resource(at, "info"), &[])
    }

    fn update_certificate(&self, at: &Instance, certificate: &UpdateCertificate) -> Result<()> {
        self.write(WriteMethod::Post, at, &resource(at, "certificate"), certificate)
    }

    fn delete_certificate(&self, at: &Instance, name: &str) -> Result<()> {
        self.delete(at, &resource(at, "certificate"), &[("name", name)])
    }

    fn list_cert_managers(&self, at: &Instance) -> Result<Vec<CertManager>> {
        self.get(at, &resource(at, "cert-manager"), &[])
    }

    fn update_cert_manager(&self, at: &Instance, request: &CertManager) -> Result<()> {
        self.write(WriteMethod::Post, at, &resource(at, "cert-manager"), request)
    }

    fn delete_cert_manager(&self, at: &Instance, issuer: &str, name: &str) -> Result<()> {
        let query = if name.is_empty() {
            ("issuer", issuer)
        } else {
            ("name", name)
        };
        self.delete(at, &resource(at, "cert-manager"), &[query])
    }

    fn list_files(&self, at: &Instance) -> Result<Vec<ExtraFile>> {
        self.get(at, &resource(at, "files"), &[])
    }

    fn get_file(&self, at: &Instance, name: &str) -> Result<ExtraFile> {
        self.get(at, &resource(at, &format!("files/{name}")), &[])
    }

    fn add_files(&self, at: &Instance, files: &[ExtraFile]) -> Result<()> {
        self.write(WriteMethod::Post, at, &resource(at, "files"), files)
    }

    fn update_files(&self, at: &Instance, files: &[ExtraFile]) -> Result<()> {
        self.write(WriteMethod::Put, at, &resource(at, "files"), files)
    }

    fn delete_files(&self, at: &Instance, names: &[String]) -> Result<()> {
        let query: Vec<(&str, &str)> = names.iter().map(|n| ("name", n.as_str())).collect();
        self.delete(at, &resource(at, "files"), &query)
    }

    fn get_autoscale(&self, at: &Instance) -> Result<Option<Autoscale>> {
        match self.get(at, &resource(at, "autoscale"), &[]) {
            Ok(autoscale) => Ok(Some(autoscale)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn update_autoscale(&self, at: &Instance, autoscale: &Autoscale) -> Result<()> {
        self.write(WriteMethod::Post, at, &resource(at, "autoscale"), autoscale)
    }

    fn remove_autoscale(&self, at: &Instance) -> Result<()> {
        self.delete(at, &resource(at, "autoscale"), &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tsuru() -> HttpBackend {
        HttpBackend::new(&ClientConfig {
            target: Target::Tsuru {
                host: "https://tsuru.example.com/".into(),
                token: "t0k3n".into(),
            },
            skip_cert_verification: false,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn test_proxy_url_names_service_and_instance() {
        let backend = tsuru();
        let at = Instance::new("rpaasv2-be", "my-rpaas");
        assert_eq!(
            backend.url(&at, &resource(&at, "route")),
            "https://tsuru.example.com/services/rpaasv2-be/proxy/my-rpaas"
        );
    }

    #[test]
    fn test_direct_url_appends_resource_path() {
        let backend = HttpBackend::new(&ClientConfig {
            target: Target::Direct {
                url: "http://localhost:9999".into(),
            },
            skip_cert_verification: true,
            timeout: Duration::from_secs(5),
        })
        .unwrap();
        let at = Instance::new("rpaasv2-be", "my-rpaas");
        assert_eq!(
            backend.url(&at, &resource(&at, "files/index.html")),
            "http://localhost:9999/resources/my-rpaas/files/index.html"
        );
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = HttpBackend::new(&ClientConfig {
            target: Target::Tsuru {
                host: String::new(),
                token: "t".into(),
            },
            skip_cert_verification: false,
            timeout: Duration::from_secs(5),
        });
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
