use chrono::{DateTime, Utc};
use log::{debug, warn};
use mailparse::{parse_mail, DispositionType, MailHeaderMap, ParsedMail};

use crate::error::{BridgeError, Result};
use crate::extract::DocumentKind;

#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn kind(&self) -> Option<DocumentKind> {
        DocumentKind::from_mime(&self.content_type, Some(&self.filename))
    }
}

/// A saved statement e-mail (`.eml`).
#[derive(Debug, Clone)]
pub struct StatementMessage {
    pub sender: String,
    pub subject: String,
    pub received_at: DateTime<Utc>,
    pub body_html: Option<String>,
    pub body_text: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl StatementMessage {
    /// The part that carries the statement: the first PDF attachment, else
    /// the first CSV attachment, else the HTML body, else the plain body.
    pub fn statement_document(&self) -> Result<(&[u8], DocumentKind)> {
        for wanted in [DocumentKind::Pdf, DocumentKind::Csv] {
            if let Some(att) = self.attachments.iter().find(|a| a.kind() == Some(wanted)) {
                debug!("Using attachment {} ({} bytes)", att.filename, att.data.len());
                return Ok((&att.data, wanted));
            }
        }
        match (&self.body_html, &self.body_text) {
            (Some(html), _) => Ok((html.as_bytes(), DocumentKind::Html)),
            (None, Some(text)) => Ok((text.as_bytes(), DocumentKind::Text)),
            (None, None) => Err(BridgeError::Mail(format!(
                "no PDF, CSV or HTML statement in {:?}",
                self.subject
            ))),
        }
    }
}

pub fn read_message(bytes: &[u8]) -> Result<StatementMessage> {
    let mail = parse_mail(bytes).map_err(|e| BridgeError::Mail(e.to_string()))?;
    let header = |name: &str| mail.headers.get_first_value(name).unwrap_or_default();

    let date_header = header("Date");
    let received_at = match mailparse::dateparse(&date_header)
        .ok()
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
    {
        Some(dt) => dt,
        None => {
            warn!("Unparseable Date header {date_header:?}, using current time");
            Utc::now()
        }
    };

    let mut message = StatementMessage {
        sender: header("From"),
        subject: header("Subject"),
        received_at,
        body_html: None,
        body_text: None,
        attachments: Vec::new(),
    };
    collect_parts(&mail, &mut message);
    debug!(
        "Read message {:?} from {} with {} attachments",
        message.subject,
        message.sender,
        message.attachments.len()
    );
    Ok(message)
}

fn collect_parts(part: &ParsedMail, message: &mut StatementMessage) {
    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            collect_parts(sub, message);
        }
        return;
    }

    let disposition = part.get_content_disposition();
    let filename = disposition
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .cloned();
    let mime = part.ctype.mimetype.to_ascii_lowercase();

    if disposition.disposition == DispositionType::Attachment || filename.is_some() {
        match part.get_body_raw() {
            Ok(data) => message.attachments.push(Attachment {
                filename: filename.unwrap_or_else(|| "attachment".to_string()),
                content_type: mime,
                data,
            }),
            Err(e) => warn!("Skipping undecodable attachment: {e}"),
        }
        return;
    }

    let slot = match mime.as_str() {
        "text/html" => &mut message.body_html,
        "text/plain" => &mut message.body_text,
        _ => return,
    };
    if slot.is_none() {
        match part.get_body() {
            Ok(body) => *slot = Some(body),
            Err(e) => warn!("Skipping undecodable {mime} body: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTIPART: &str = "From: TymeBank <statements@tymebank.co.za>\r
To: owner@example.com\r
Subject: Your September statement\r
Date: Thu, 02 Oct 2025 08:15:00 +0200\r
MIME-Version: 1.0\r
Content-Type: multipart/mixed; boundary=\"XYZ\"\r
\r
--XYZ\r
Content-Type: text/html; charset=utf-8\r
\r
<p>Your statement is attached.</p>\r
--XYZ\r
Content-Type: application/octet-stream; name=\"Statement.pdf\"\r
Content-Disposition: attachment; filename=\"Statement.pdf\"\r
Content-Transfer-Encoding: base64\r
\r
JVBERi0xLjQ=\r
--XYZ--\r
";

    const HTML_ONLY: &str = "From: alerts@bank.example\r
Subject: Transactions\r
Date: not a date\r
Content-Type: text/html; charset=utf-8\r
\r
<table><tr><th>Date</th></tr><tr><td>12/01/2024</td><td>Shop</td><td>-5.00</td></tr></table>\r
";

    #[test]
    fn test_read_multipart_statement() {
        let msg = read_message(MULTIPART.as_bytes()).unwrap();
        assert!(msg.sender.contains("tymebank"));
        assert_eq!(msg.subject, "Your September statement");
        assert_eq!(msg.received_at.to_rfc3339(), "2025-10-02T06:15:00+00:00");
        assert_eq!(msg.attachments.len(), 1);
        assert_eq!(msg.attachments[0].kind(), Some(DocumentKind::Pdf));
        assert_eq!(msg.attachments[0].filename, "Statement.pdf");
        assert_eq!(msg.attachments[0].data, b"%PDF-1.4");
        assert!(msg.body_html.as_deref().unwrap_or("").contains("attached"));

        let (data, kind) = msg.statement_document().unwrap();
        assert_eq!(kind, DocumentKind::Pdf);
        assert_eq!(data, b"%PDF-1.4");
    }

    #[test]
    fn test_html_body_fallback_and_bad_date() {
        let msg = read_message(HTML_ONLY.as_bytes()).unwrap();
        assert!(msg.attachments.is_empty());
        let (data, kind) = msg.statement_document().unwrap();
        assert_eq!(kind, DocumentKind::Html);
        assert!(String::from_utf8_lossy(data).contains("12/01/2024"));
    }

    #[test]
    fn test_plain_body_fallback() {
        let raw = "From: a@b.c\r\nSubject: hi\r\nContent-Type: text/plain\r\n\r\nhello\r\n";
        let msg = read_message(raw.as_bytes()).unwrap();
        assert_eq!(msg.body_text.as_deref().map(str::trim), Some("hello"));
        let (_, kind) = msg.statement_document().unwrap();
        assert_eq!(kind, DocumentKind::Text);
    }

    #[test]
    fn test_message_without_statement() {
        let raw = "From: a@b.c\r\nSubject: hi\r\nContent-Type: image/png\r\n\r\nxyz\r\n";
        let msg = read_message(raw.as_bytes()).unwrap();
        assert!(matches!(msg.statement_document(), Err(BridgeError::Mail(_))));
    }
}
