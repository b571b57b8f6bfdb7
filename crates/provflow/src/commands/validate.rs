use colored::Colorize;
use provflow_cloud_aliyun::Credentials;
use provflow_config::Config;
use std::path::Path;

/// Declared sections summarised after a successful load
const SECTIONS: [(&str, &str); 7] = [
    ("VPCs", "aliyun.vpc.vpc"),
    ("VSwitches", "aliyun.vpc.vswitch"),
    ("RDS instances", "aliyun.rds"),
    ("Load balancers", "aliyun.slb.balancer"),
    ("Swarm clusters", "aliyun.cs.swarm"),
    ("DNS records", "aliyun.dns"),
    ("OSS buckets", "aliyun.oss"),
];

pub fn handle(explicit: Option<&Path>) -> anyhow::Result<()> {
    println!("{}", "Validating configuration...".blue());

    let (path, config) = match provflow_config::load_config(explicit) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Configuration not loaded".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };
    println!("Config file: {}", path.display().to_string().cyan());

    let credentials = match Credentials::resolve(&config) {
        Ok(credentials) => credentials,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Credentials error".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    println!("{}", "✓ Configuration is valid".green().bold());
    println!();
    println!("Summary:");
    match config.get_string("code").filter(|c| !c.trim().is_empty()) {
        Some(code) => println!("  code: {}", code.cyan()),
        None => println!("  code: {}", "(pass --code when running)".yellow()),
    }
    println!("  region: {}", credentials.region.cyan());

    for (label, names) in summary(&config) {
        println!("  {}: {}", label, names.len());
        for name in names {
            println!("    - {}", name.cyan());
        }
    }

    Ok(())
}

/// Non-empty declared sections and their entry names
fn summary(config: &Config) -> Vec<(&'static str, Vec<String>)> {
    SECTIONS
        .iter()
        .map(|(label, path)| (*label, config.get_config(path).keys()))
        .filter(|(_, names)| !names.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_lists_declared_sections() {
        let config = Config::from_yaml_str(
            r#"
code: shop
aliyun:
  vpc:
    vpc:
      main:
        cidr-block: 10.0.0.0/16
  oss:
    assets: {}
    backups: {}
"#,
        )
        .unwrap();

        let summary = summary(&config);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0], ("VPCs", vec!["main".to_string()]));
        assert_eq!(
            summary[1],
            ("OSS buckets", vec!["assets".to_string(), "backups".to_string()])
        );
    }

    #[test]
    fn test_summary_of_empty_config() {
        assert!(summary(&Config::empty()).is_empty());
    }
}
