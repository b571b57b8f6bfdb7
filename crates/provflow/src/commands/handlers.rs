use colored::Colorize;
use provflow_cloud_aliyun::{AliyunProvider, handlers};

pub fn handle() {
    let registry = handlers::registry(AliyunProvider::cli());

    println!("{}", format!("{} handlers", registry.len()).bold());
    for name in registry.names() {
        println!("  {}", name.cyan());
    }
}
