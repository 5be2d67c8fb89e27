use super::print_log;
use crate::App;
use anyhow::{Result, bail};
use provisioning::InstallRequest;
use service_templates::Tool;

/// Parse a `key=value` override
pub fn parse_setting(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got {:?}", raw)),
    }
}

pub async fn install(
    app: &App,
    tool: Tool,
    domain: Option<String>,
    settings: Vec<(String, String)>,
) -> Result<()> {
    let mut request = InstallRequest::new(tool);
    if let Some(domain) = domain {
        request = request.with_domain(domain);
    }
    for (key, value) in settings {
        request = request.with_setting(key, value);
    }

    let outcome = app.provisioner.install_tool(&request, Some(&print_log)).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if !outcome.success {
        bail!(
            "installing {} failed: {}",
            tool,
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

pub async fn uninstall(app: &App, tool: Tool) -> Result<()> {
    let outcome = app.provisioner.uninstall_tool(tool, Some(&print_log)).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if !outcome.success {
        bail!(
            "uninstalling {} failed: {}",
            tool,
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}
