use super::SECTION;
use crate::api::{CreateListener, HealthCheck, HttpOptions, ListenerProtocol, LoadBalancerRecord};
use crate::provider::Aliyun;
use provflow_cloud::{
    Action, ApplyResult, CloudError, Executor, Plan, Result, WaitConfig, WhenMissing, diff,
};
use provflow_config::Config;
use std::collections::HashMap;

/// Status of a listener that serves traffic
const RUNNING: &str = "running";

/// One step of listener reconciliation
#[derive(Debug, Clone)]
enum ListenerStep {
    Create(CreateListener),
    /// Existing listener that is not running
    Start { load_balancer_id: String, port: i64 },
}

fn listener_running() -> WaitConfig {
    WaitConfig::secs(10, 2).when_missing(WhenMissing::Retry)
}

fn health_check(protocol: ListenerProtocol, entry: &Config) -> HealthCheck {
    let hc = entry.get_config("health-check");

    HealthCheck {
        check: hc.get_string_or("check", "on"),
        check_type: (protocol == ListenerProtocol::Tcp).then(|| hc.get_string_or("type", "tcp")),
        domain: hc.get_string("domain"),
        uri: hc.get_string("url"),
        connect_port: hc.get_i64("connect-port"),
        healthy_threshold: hc.get_i64_or("threshold", 3),
        unhealthy_threshold: hc.get_i64_or("unhealthy-threshold", 3),
        timeout: hc.get_i64_or("timeout", 5),
        interval: hc.get_i64_or("interval", 2),
        http_code: hc.get_string("http-code").or_else(|| {
            (protocol.is_http() || protocol == ListenerProtocol::Tcp).then(|| "http_2xx".to_string())
        }),
    }
}

fn http_options(entry: &Config) -> HttpOptions {
    HttpOptions {
        gzip: entry.get_string_or("gzip", "on"),
        sticky_session: entry.get_string_or("sticky-session", "off"),
        sticky_session_type: entry.get_string_or("sticky-session-type", "insert"),
        cookie_timeout: entry.get_i64_or("cookie-timeout", 86400),
        cookie: entry.get_string("cookie"),
        x_forwarded_for_slb_id: entry.get_string_or("x-forwarded-for-slb-id", "on"),
        x_forwarded_for_slb_ip: entry.get_string_or("x-forwarded-for-slb-ip", "on"),
        x_forwarded_for_proto: entry.get_string_or("x-forwarded-for-proto", "on"),
        server_certificate_id: None,
        ca_certificate_id: None,
    }
}

/// Positive `listen-port` of a declared listener
pub(super) fn listen_port(entry_name: &str, entry: &Config) -> Result<i64> {
    match entry.get_i64("listen-port") {
        Some(port) if port > 0 => Ok(port),
        _ => Err(CloudError::invalid(entry_name, "listen-port must be positive")),
    }
}

impl Aliyun {
    async fn create_listener_request(
        &self,
        protocol: ListenerProtocol,
        path: &str,
        lb: &LoadBalancerRecord,
        entry: &Config,
    ) -> Result<CreateListener> {
        let vserver_group = entry.get_string_or("vserver-group", "on");
        let vserver_group_id = if vserver_group == "on" {
            let group = entry
                .get_string("vserver-group-name")
                .ok_or_else(|| CloudError::invalid(path, "vserver-group-name is empty"))?;
            Some(self.vserver_group_id(&lb.load_balancer_id, &group).await?)
        } else {
            None
        };

        let http = match protocol {
            ListenerProtocol::Http => Some(http_options(entry)),
            ListenerProtocol::Https => {
                let cert = entry
                    .get_string("server-certificate-name")
                    .ok_or_else(|| CloudError::invalid(path, "server-certificate-name is empty"))?;

                let mut options = http_options(entry);
                options.server_certificate_id = Some(self.server_certificate_id(&cert).await?);
                if let Some(ca) = entry.get_string("ca-certificate-name") {
                    options.ca_certificate_id = Some(self.ca_certificate_id(&ca).await?);
                }
                Some(options)
            }
            ListenerProtocol::Tcp | ListenerProtocol::Udp => None,
        };

        Ok(CreateListener {
            load_balancer_id: lb.load_balancer_id.clone(),
            protocol,
            listen_port: listen_port(path, entry)?,
            backend_port: entry.get_i64("server-port"),
            bandwidth: entry.get_i64_or("band-width", -1),
            scheduler: entry.get_string_or("scheduler", "wrr"),
            vserver_group,
            vserver_group_id,
            persistence_timeout: (!protocol.is_http())
                .then(|| entry.get_i64("persistence-timeout"))
                .flatten(),
            health_check: health_check(protocol, entry),
            http,
        })
    }

    /// Create, start and await every declared `protocol` listener.
    ///
    /// Declared listeners that already exist but are stopped are started.
    pub async fn create_listeners(&self, protocol: ListenerProtocol) -> Result<ApplyResult> {
        let section = self.section(SECTION);
        let mut plan = Plan::new();

        for (lb_name, lb) in self.require_balancers().await? {
            let listeners = section.get_config(&format!("{lb_name}.listener.{protocol}"));
            let names = listeners.keys();
            if names.is_empty() {
                continue;
            }

            let ports = self.clients.slb.listener_ports(&lb.load_balancer_id).await?;
            let mut existing = HashMap::new();
            for name in &names {
                let path = format!("{lb_name}.listener.{protocol}.{name}");
                let port = listen_port(&path, &listeners.get_config(name))?;
                if ports.contains(&port) {
                    existing.insert(name.clone(), port);
                }
            }

            let diff = diff("slb-listener", &names, &existing, |_| Ok(()))?;
            for name in diff.already_exists {
                let port = existing[&name];
                let status = self
                    .clients
                    .slb
                    .listener_status(&lb.load_balancer_id, port)
                    .await?;
                if status.as_deref() == Some(RUNNING) {
                    plan.keep(format!("{lb_name}/{name}"));
                } else {
                    tracing::info!(
                        code = self.code(),
                        listener = %format!("{lb_name}/{name}"),
                        status = ?status,
                        "Listener exists but is not running"
                    );
                    plan.push(Action::update(
                        format!("slb-listener-{protocol}"),
                        format!("{lb_name}/{name}"),
                        ListenerStep::Start {
                            load_balancer_id: lb.load_balancer_id.clone(),
                            port,
                        },
                    ));
                }
            }
            for name in diff.to_create {
                let path = format!("{lb_name}.listener.{protocol}.{name}");
                let request = self
                    .create_listener_request(protocol, &path, &lb, &listeners.get_config(&name))
                    .await?;
                plan.push(Action::create(
                    format!("slb-listener-{protocol}"),
                    format!("{lb_name}/{name}"),
                    ListenerStep::Create(request),
                ));
            }
        }

        tracing::info!(code = self.code(), protocol = %protocol, "Listener plan: {}", plan.summary());

        let waiter = self.waiter(listener_running());
        let waiter = &waiter;

        Executor::new()
            .execute(plan, |step| async move {
                let (lb_id, port) = match &step {
                    ListenerStep::Create(request) => {
                        self.call("create slb listener", || {
                            self.clients.slb.create_listener(request)
                        })
                        .await?;
                        (request.load_balancer_id.as_str(), request.listen_port)
                    }
                    ListenerStep::Start {
                        load_balancer_id,
                        port,
                    } => (load_balancer_id.as_str(), *port),
                };

                self.call("start slb listener", || {
                    self.clients.slb.start_listener(lb_id, port)
                })
                .await?;

                let target = format!("{lb_id}:{port}");
                waiter
                    .wait_for_status(&target, RUNNING, || async move {
                        self.clients.slb.listener_status(lb_id, port).await
                    })
                    .await?;

                tracing::info!(code = self.code(), listener = %target, "Listener running");
                Ok::<_, CloudError>(target)
            })
            .await
    }
}
