//! Server-rendered HTML pages.
//!
//! Every interpolated value goes through [`escape_html`].

use serde_json::Value;

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{}</title>\n</head>\n<body>\n\
         <nav><a href=\"/\">Home</a> | <a href=\"/dashboard\">Dashboard</a> | \
         <a href=\"/slack-info\">Slack</a> | <a href=\"/logout\">Log out</a></nav>\n\
         <main>\n{body}\n</main>\n</body>\n</html>\n",
        escape_html(title)
    )
}

fn ask_form() -> &'static str {
    "<form method=\"post\" action=\"/ask\">\n\
     <label for=\"question\">Ask about your Slack workspace</label>\n\
     <input id=\"question\" name=\"question\" type=\"text\" required>\n\
     <button type=\"submit\">Ask</button>\n</form>"
}

/// JSON scalars render bare; everything else renders as compact JSON.
fn display_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn field(v: &Value, key: &str) -> String {
    v.get(key).map(display_value).unwrap_or_default()
}

pub fn index() -> String {
    layout(
        "Talk to Slack",
        "<h1>Talk to Slack</h1>\n\
         <p>Ask questions about your Slack workspace using the knowledge stored in Rememberizer.</p>\n\
         <p><a href=\"/auth/rememberizer\">Log in with Rememberizer</a></p>",
    )
}

pub fn dashboard(account: &Value) -> String {
    let name = escape_html(&field(account, "name"));
    let email = escape_html(&field(account, "email"));
    let body = format!(
        "<h1>Dashboard</h1>\n<p>Signed in as <strong>{name}</strong> ({email})</p>\n{}\n\
         <p><a href=\"/slack-info\">View Slack integration</a></p>",
        ask_form()
    );
    layout("Dashboard", &body)
}

pub fn slack_info(integration: Option<&Value>, channels: &[Value]) -> String {
    let mut body = String::from("<h1>Slack</h1>\n");
    match integration {
        None => body.push_str("<p>No Slack integration is connected to this Rememberizer account.</p>\n"),
        Some(integration) => {
            body.push_str(&format!(
                "<p>Integration <strong>{}</strong> (status: {})</p>\n",
                escape_html(&field(integration, "id")),
                escape_html(&field(integration, "status")),
            ));
            if channels.is_empty() {
                body.push_str("<p>No Slack channels have been indexed yet.</p>\n");
            } else {
                body.push_str("<ul>\n");
                for channel in channels {
                    body.push_str(&format!(
                        "<li>{} <small>(pk {})</small></li>\n",
                        escape_html(&field(channel, "name")),
                        escape_html(&field(channel, "pk")),
                    ));
                }
                body.push_str("</ul>\n");
            }
        }
    }
    body.push_str(ask_form());
    layout("Slack", &body)
}

pub fn answer(question: &str, answer: &str) -> String {
    let body = format!(
        "<h1>Answer</h1>\n<h2>Q: {}</h2>\n<div style=\"white-space: pre-wrap\">{}</div>\n{}",
        escape_html(question),
        escape_html(answer),
        ask_form()
    );
    layout("Answer", &body)
}

pub fn error(message: &str) -> String {
    let body = format!(
        "<h1>Something went wrong</h1>\n<p>{}</p>\n<p><a href=\"/\">Back to start</a></p>",
        escape_html(message)
    );
    layout("Error", &body)
}
