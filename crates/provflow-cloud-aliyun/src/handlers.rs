//! Handler registration
//!
//! Every reconciliation step is exposed under a `devops.aliyun.*` name. Each
//! invocation opens its own [`Aliyun`](crate::Aliyun) session from the
//! context and configuration it is given.

use crate::api::ListenerProtocol;
use crate::error::AliyunError;
use crate::provider::AliyunProvider;
use provflow_cloud::HandlerRegistry;

macro_rules! register_handlers {
    ($registry:expr, $provider:expr, { $($name:literal => |$aliyun:ident| $step:expr),* $(,)? }) => {
        $(
            let provider = $provider.clone();
            $registry.register($name, move |ctx, config| {
                let provider = provider.clone();
                async move {
                    let $aliyun = provider.connect(ctx, config)?;
                    $step.await?;
                    Ok::<(), AliyunError>(())
                }
            });
        )*
    };
}

/// Register every Alibaba Cloud handler against `provider`
pub fn register(registry: &mut HandlerRegistry<AliyunError>, provider: AliyunProvider) {
    register_handlers!(registry, provider, {
        "devops.aliyun.vpc.vpc.create" => |aliyun| aliyun.create_vpcs(),
        "devops.aliyun.vpc.vpc.delete" => |aliyun| aliyun.delete_vpcs(),
        "devops.aliyun.vpc.vpc.running.wait" => |aliyun| aliyun.wait_vpcs_available(),
        "devops.aliyun.vpc.vswitch.create" => |aliyun| aliyun.create_vswitches(),
        "devops.aliyun.vpc.vswitch.delete" => |aliyun| aliyun.delete_vswitches(),
        "devops.aliyun.vpc.vswitch.available.wait" => |aliyun| aliyun.wait_vswitches_available(),

        "devops.aliyun.rds.db.create" => |aliyun| aliyun.create_db_instances(),
        "devops.aliyun.rds.db.delete" => |aliyun| aliyun.delete_db_instances(),
        "devops.aliyun.rds.db.attribute.describe" => |aliyun| aliyun.describe_db_attributes(),
        "devops.aliyun.rds.db.netinfo.describe" => |aliyun| aliyun.describe_db_net_info(),
        "devops.aliyun.rds.db.running.wait" => |aliyun| aliyun.wait_db_instances_running(),
        "devops.aliyun.rds.db.account.create" => |aliyun| aliyun.create_db_accounts(),
        "devops.aliyun.rds.db.conn.public.alloc" => |aliyun| aliyun.allocate_public_connections(),
        "devops.aliyun.rds.db.conn.public.release" => |aliyun| aliyun.release_public_connections(),

        "devops.aliyun.slb.balancer.describe" => |aliyun| aliyun.describe_balancers(),
        "devops.aliyun.slb.balancer.create" => |aliyun| aliyun.create_balancers(),
        "devops.aliyun.slb.balancer.delete" => |aliyun| aliyun.delete_balancers(),
        "devops.aliyun.slb.balancer.listener.http.create" => |aliyun| aliyun.create_listeners(ListenerProtocol::Http),
        "devops.aliyun.slb.balancer.listener.https.create" => |aliyun| aliyun.create_listeners(ListenerProtocol::Https),
        "devops.aliyun.slb.balancer.listener.tcp.create" => |aliyun| aliyun.create_listeners(ListenerProtocol::Tcp),
        "devops.aliyun.slb.balancer.listener.udp.create" => |aliyun| aliyun.create_listeners(ListenerProtocol::Udp),
        "devops.aliyun.slb.balancer.listener.vserver-group.create" => |aliyun| aliyun.create_vserver_groups(),
        "devops.aliyun.slb.balancer.listener.rules.create" => |aliyun| aliyun.create_listener_rules(),

        "devops.aliyun.cs.cluster.create" => |aliyun| aliyun.create_clusters(),
        "devops.aliyun.cs.cluster.delete" => |aliyun| aliyun.delete_clusters(),
        "devops.aliyun.cs.cluster.running.wait" => |aliyun| aliyun.wait_clusters_running(),
        "devops.aliyun.cs.cluster.deleted.wait" => |aliyun| aliyun.wait_clusters_deleted(),
        "devops.aliyun.cs.cluster.volume.create" => |aliyun| aliyun.create_volumes(),
        "devops.aliyun.cs.cluster.project.create" => |aliyun| aliyun.create_projects(),
        "devops.aliyun.cs.cluster.project.delete" => |aliyun| aliyun.delete_projects(),

        "devops.aliyun.dns.domain.record.add" => |aliyun| aliyun.add_domain_records(),
        "devops.aliyun.dns.domain.record.update" => |aliyun| aliyun.update_domain_records(),
        "devops.aliyun.dns.domain.record.delete" => |aliyun| aliyun.delete_domain_records(),

        "devops.aliyun.oss.bucket.create" => |aliyun| aliyun.create_buckets(),
        "devops.aliyun.oss.bucket.delete" => |aliyun| aliyun.delete_buckets(),
    });
}

/// Registry holding every Alibaba Cloud handler
pub fn registry(provider: AliyunProvider) -> HandlerRegistry<AliyunError> {
    let mut registry = HandlerRegistry::new();
    register(&mut registry, provider);
    registry
}
