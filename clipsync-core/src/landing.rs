use crate::SEND_PATH;

/// Line in the landing template that receives the ingestion URL.
pub const TARGET_URL_PLACEHOLDER: &str = "const targetUrl = '';";

pub fn send_url(host: &str, port: u16) -> String {
    format!("http://{host}:{port}{SEND_PATH}")
}

/// Substitutes the ingestion URL into the landing template.
///
/// Templates without the placeholder are returned unchanged.
pub fn render_landing(template: &str, target_url: &str) -> String {
    template.replace(
        TARGET_URL_PLACEHOLDER,
        &format!("const targetUrl = '{target_url}';"),
    )
}
