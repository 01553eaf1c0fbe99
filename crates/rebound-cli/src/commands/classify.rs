use anyhow::Result;
use rebound_core::{ErrorDescriptor, OperationKind, RemoteError};

#[derive(Debug, clap::Args)]
pub struct ClassifyArgs {
    /// HTTP status the remote answered with (ignored with --transport)
    #[arg(long, default_value_t = 0)]
    pub status: u16,

    /// Symbolic error code from the response body
    #[arg(long, default_value = "")]
    pub code: String,

    /// Human-readable error message
    #[arg(long, default_value = "")]
    pub message: String,

    /// URL of the failed request, for transport failures
    #[arg(long)]
    pub url: Option<String>,

    /// Treat the failure as a transport error (no HTTP response)
    #[arg(long)]
    pub transport: bool,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

impl ClassifyArgs {
    fn to_remote_error(&self) -> RemoteError {
        if self.transport {
            RemoteError::transport(self.url.clone(), self.message.clone())
        } else {
            RemoteError::api(self.status, self.code.clone(), self.message.clone())
        }
    }
}

fn render_json(descriptor: &ErrorDescriptor) -> serde_json::Value {
    let decisions: serde_json::Map<String, serde_json::Value> = OperationKind::ALL
        .iter()
        .map(|kind| {
            (
                kind.to_string(),
                serde_json::json!(descriptor.retry_decision(*kind)),
            )
        })
        .collect();

    serde_json::json!({
        "descriptor": descriptor,
        "remediation": descriptor.category().remediation(),
        "retry": decisions,
    })
}

fn render_text(descriptor: &ErrorDescriptor) -> String {
    let mut lines = vec![
        format!("Status:      {}", descriptor.status_code()),
        format!(
            "Code:        {}",
            if descriptor.error_code().is_empty() {
                "<none>"
            } else {
                descriptor.error_code()
            }
        ),
        format!("Message:     {}", descriptor.message()),
        format!("Category:    {}", descriptor.category()),
        format!("Remediation: {}", descriptor.category().remediation()),
    ];
    for kind in OperationKind::ALL {
        lines.push(format!(
            "On {:<8} {}",
            format!("{kind}:"),
            descriptor.retry_decision(kind)
        ));
    }
    lines.join("\n")
}

/// Classify one failure and print the result.
pub fn run_classify(args: &ClassifyArgs) -> Result<()> {
    let descriptor = ErrorDescriptor::from(args.to_remote_error());
    log::debug!("Classified {} as {}", descriptor, descriptor.category());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&render_json(&descriptor))?);
    } else {
        println!("{}", render_text(&descriptor));
    }

    Ok(())
}
