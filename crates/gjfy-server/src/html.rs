//! Server-rendered pages for people following a shared link.

use crate::store::{HiddenEntryInfo, StoreEntryInfo};

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn master(title: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
	<title>GJFY - {title}</title>
	<link rel="shortcut icon" type="image/x-icon" href="favicon.ico" />
	<link rel="stylesheet" type="text/css" href="custom.css">
</head>
<body>
<div id="contentcontainer">
<div id="content">
{content}
</div>
</div>
</body>
</html>
"#
    )
}

/// The page that discloses a secret.
pub fn view_page(info: &StoreEntryInfo) -> String {
    let content = format!(
        r#"<h2 id="mainheading">{id}</h2>
<div>
	The link you just invoked contains a secret (e. g. a password) somebody wants to share with you.
	It will be valid only for a short time and you might not be able to invoke it again.
	Please make sure you memorise the secret or write it down in an appropriate way.
</div>
<div>The secret contained in this link is as follows:</div>
<div id="secret">{secret}</div>"#,
        id = escape(&info.id),
        secret = escape(&info.entry.secret),
    );
    master("VIEW", &content)
}

/// Metadata about a shared link, without the secret.
pub fn info_page(info: &HiddenEntryInfo) -> String {
    let url = escape(&info.url);
    let content = format!(
        r#"<h2 id="mainheading">{id}</h2>
<table id="info">
<tr>
	<th>Url</th>
	<th>PathQuery</th>
	<th>MaxClicks</th>
	<th>Clicks</th>
	<th>DateAdded</th>
	<th>ExpiresAt</th>
</tr>
<tr>
	<td><a href="{url}">{url}</a></td>
	<td>{path_query}</td>
	<td>{max_clicks}</td>
	<td>{clicks}</td>
	<td>{date_added}</td>
	<td>{expires_at}</td>
</tr>
</table>"#,
        id = escape(&info.id),
        path_query = escape(&info.path_query),
        max_clicks = info.entry.max_clicks,
        clicks = info.entry.clicks,
        date_added = info.entry.date_added.to_rfc3339(),
        expires_at = info.entry.expires_at().to_rfc3339(),
    );
    master("VIEWINFO", &content)
}

/// Shown when an id is unknown, used up or expired.
pub fn error_page() -> String {
    master(
        "ERROR",
        r#"<h2 id="errorheading">Not available</h2>
<p id="errormessage">This ID is not valid anymore. Please request another one from the person who sent you this link.</p>"#,
    )
}
