use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::models::FeedItem;

use super::Notification;

const FOOTER: &str = "This email was sent by the RSS to Email service.";
const TEXT_WIDTH: usize = 78;

pub fn render(feed_name: &str, item: &FeedItem) -> Notification {
    let published = item
        .published
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "Unknown".to_string());

    let summary_text = html2text::from_read(item.summary.as_bytes(), TEXT_WIDTH)
        .unwrap_or_else(|_| item.summary.clone());

    let subject = format!("[RSS] {}: {}", single_line(feed_name), single_line(&item.title));

    let text_body = format!(
        "New post from {feed_name}\n\n\
         Title: {title}\n\
         Link: {link}\n\
         Published: {published}\n\n\
         {summary}\n\n\
         ---\n\
         {FOOTER}\n",
        title = item.title,
        link = item.link,
        summary = summary_text.trim_end(),
    );

    let html_body = format!(
        r#"<html>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <h2 style="color: #2c3e50;">New post from {feed_name}</h2>
    <div style="background-color: #f8f9fa; padding: 15px; border-left: 4px solid #3498db; margin: 20px 0;">
        <h3 style="margin-top: 0;">
            <a href="{link}" style="color: #2980b9; text-decoration: none;">{title}</a>
        </h3>
        <p style="color: #7f8c8d; font-size: 0.9em;"><strong>Published:</strong> {published}</p>
    </div>
    <div style="margin: 20px 0;">
        {summary}
    </div>
    <div style="margin-top: 30px; padding-top: 20px; border-top: 1px solid #ecf0f1;">
        <p style="color: #95a5a6; font-size: 0.85em;">{FOOTER}</p>
    </div>
</body>
</html>
"#,
        feed_name = encode_text(feed_name),
        link = encode_double_quoted_attribute(&item.link),
        title = encode_text(&item.title),
        summary = item.summary,
    );

    Notification {
        subject,
        text_body,
        html_body,
    }
}

/// Header values must not carry line breaks.
fn single_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
