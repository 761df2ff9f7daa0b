//! HTML pages served into the authorization surface
//!
//! Pure markup generation; all selection logic stays in [`crate::SelectionState`]
//! and the callback server's endpoints. Every page posts its terminal action
//! back to the loopback server and closes itself, so the user is never left
//! staring at a stuck window.

use tether_types::{ErrorReport, ResourceReference};

use crate::SelectionState;

const PAGE_STYLE: &str = r#"
body { font-family: system-ui, -apple-system, sans-serif; max-width: 640px; margin: 48px auto; color: #1e293b; }
h1 { font-size: 20px; }
ul { list-style: none; padding: 0; }
li { padding: 6px 8px; border-bottom: 1px solid #e2e8f0; }
li label { cursor: pointer; }
.type { color: #64748b; font-size: 12px; margin-left: 8px; }
.actions { margin: 16px 0; display: flex; gap: 8px; }
button { padding: 8px 16px; border: 1px solid #cbd5e1; border-radius: 6px; background: #fff; cursor: pointer; }
button.primary { background: #2563eb; border-color: #2563eb; color: #fff; }
.error { color: #dc2626; }
.muted { color: #64748b; }
"#;

/// Shared beacon script: tells the opener the surface was closed by the user
/// so the flow can be cancelled instead of hanging until timeout
const CLOSE_BEACON_SCRIPT: &str = r#"
let finished = false;
window.addEventListener('pagehide', () => {
  if (!finished) { navigator.sendBeacon('/surface/closed'); }
});
"#;

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Resource browser for Notion: pages and databases with checkboxes,
/// select-all/deselect-all over the current listing, and a finish action
pub fn notion_picker_page(listed: &[ResourceReference], selection: &SelectionState) -> String {
    let mut items = String::new();
    for resource in listed {
        let checked = if selection.is_selected(&resource.id) {
            "checked"
        } else {
            ""
        };
        items.push_str(&format!(
            r#"<li><label><input type="checkbox" data-id="{id}" data-name="{name}" data-type="{rtype}" {checked}> {name}<span class="type">{rtype}</span></label></li>"#,
            id = escape_html(&resource.id),
            name = escape_html(&resource.name),
            rtype = escape_html(&resource.resource_type),
            checked = checked,
        ));
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<title>Select Notion pages</title>
<style>{style}</style>
</head>
<body>
<h1>Choose pages and databases</h1>
<p class="muted">Tick the items this connection may read, then press Finish.</p>
<div class="actions">
  <button id="select-all">Select all</button>
  <button id="deselect-all">Deselect all</button>
  <button id="finish" class="primary">Finish</button>
</div>
<p id="message" class="error"></p>
<ul id="resources">{items}</ul>
<script>
{beacon}
const message = document.getElementById('message');
const boxes = () => Array.from(document.querySelectorAll('input[type=checkbox]'));
const itemOf = (box) => ({{ id: box.dataset.id, name: box.dataset.name, type: box.dataset.type }});

document.getElementById('resources').addEventListener('change', (e) => {{
  fetch('/picker/toggle', {{
    method: 'POST',
    headers: {{ 'Content-Type': 'application/json' }},
    body: JSON.stringify(itemOf(e.target)),
  }});
}});
document.getElementById('select-all').addEventListener('click', () => {{
  boxes().forEach((b) => (b.checked = true));
  fetch('/picker/select-all', {{ method: 'POST' }});
}});
document.getElementById('deselect-all').addEventListener('click', () => {{
  boxes().forEach((b) => (b.checked = false));
  fetch('/picker/deselect-all', {{ method: 'POST' }});
}});
document.getElementById('finish').addEventListener('click', async () => {{
  const response = await fetch('/picker/finalize', {{ method: 'POST' }});
  if (response.ok) {{
    finished = true;
    document.body.innerHTML = await response.text();
    window.close();
  }} else {{
    const report = await response.json();
    message.textContent = report.message;
  }}
}});
</script>
</body>
</html>"#,
        style = PAGE_STYLE,
        items = items,
        beacon = CLOSE_BEACON_SCRIPT,
    )
}

/// Embed shell for the Google Picker widget.
///
/// The provider widget owns browsing; chosen documents are pushed through the
/// same toggle/finalize contract as the native list.
pub fn drive_picker_page(api_key: &str, access_token: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<title>Select Google Drive files</title>
<style>{style}</style>
<script src="https://apis.google.com/js/api.js"></script>
</head>
<body>
<h1>Choose Drive files</h1>
<p class="muted">A Google file picker will open. Your choices are reported back automatically.</p>
<p id="message" class="error"></p>
<script>
{beacon}
const ACCESS_TOKEN = "{token}";
const API_KEY = "{api_key}";

function onPicked(data) {{
  if (data.action === google.picker.Action.CANCEL) {{
    navigator.sendBeacon('/surface/closed');
    finished = true;
    window.close();
    return;
  }}
  if (data.action !== google.picker.Action.PICKED) return;
  const posts = data.docs.map((doc) =>
    fetch('/picker/toggle', {{
      method: 'POST',
      headers: {{ 'Content-Type': 'application/json' }},
      body: JSON.stringify({{ id: doc.id, name: doc.name, type: doc.mimeType }}),
    }})
  );
  Promise.all(posts)
    .then(() => fetch('/picker/finalize', {{ method: 'POST' }}))
    .then(async (response) => {{
      if (response.ok) {{
        finished = true;
        document.body.innerHTML = await response.text();
        window.close();
      }} else {{
        const report = await response.json();
        document.getElementById('message').textContent = report.message;
      }}
    }});
}}

gapi.load('picker', () => {{
  const picker = new google.picker.PickerBuilder()
    .addView(google.picker.ViewId.DOCS)
    .enableFeature(google.picker.Feature.MULTISELECT_ENABLED)
    .setOAuthToken(ACCESS_TOKEN)
    .setDeveloperKey(API_KEY)
    .setCallback(onPicked)
    .build();
  picker.setVisible(true);
}});
</script>
</body>
</html>"#,
        style = PAGE_STYLE,
        beacon = CLOSE_BEACON_SCRIPT,
        token = escape_html(access_token),
        api_key = escape_html(api_key),
    )
}

/// Embed shell for the Dropbox chooser widget
pub fn dropbox_chooser_page(app_key: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<title>Select Dropbox files</title>
<style>{style}</style>
<script src="https://www.dropbox.com/static/api/2/dropins.js" id="dropboxjs" data-app-key="{app_key}"></script>
</head>
<body>
<h1>Choose Dropbox files</h1>
<p class="muted">A Dropbox chooser will open. Your choices are reported back automatically.</p>
<p id="message" class="error"></p>
<script>
{beacon}
Dropbox.choose({{
  multiselect: true,
  linkType: 'preview',
  success: (files) => {{
    const posts = files.map((file) =>
      fetch('/picker/toggle', {{
        method: 'POST',
        headers: {{ 'Content-Type': 'application/json' }},
        body: JSON.stringify({{ id: file.id, name: file.name, type: 'file' }}),
      }})
    );
    Promise.all(posts)
      .then(() => fetch('/picker/finalize', {{ method: 'POST' }}))
      .then(async (response) => {{
        if (response.ok) {{
          finished = true;
          document.body.innerHTML = await response.text();
          window.close();
        }} else {{
          const report = await response.json();
          document.getElementById('message').textContent = report.message;
        }}
      }});
  }},
  cancel: () => {{
    navigator.sendBeacon('/surface/closed');
    finished = true;
    window.close();
  }},
}});
</script>
</body>
</html>"#,
        style = PAGE_STYLE,
        beacon = CLOSE_BEACON_SCRIPT,
        app_key = escape_html(app_key),
    )
}

/// Terminal success page; the surface closes itself
pub fn flow_complete_page() -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Selection complete</title><style>{style}</style></head>
<body>
<h1>Selection complete</h1>
<p class="muted">You can close this window and return to the application.</p>
<script>window.close();</script>
</body>
</html>"#,
        style = PAGE_STYLE,
    )
}

/// Terminal error page; the surface closes itself after showing the message
pub fn flow_error_page(report: &ErrorReport) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Connection failed</title><style>{style}</style></head>
<body>
<h1 class="error">Connection failed</h1>
<p>{message}</p>
<p class="muted">This window will close itself; you can return to the application.</p>
<script>setTimeout(() => window.close(), 4000);</script>
</body>
</html>"#,
        style = PAGE_STYLE,
        message = escape_html(&report.message),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notion_page_marks_preselected_items() {
        let listed = vec![
            ResourceReference::new("p1", "Roadmap", "page"),
            ResourceReference::new("db1", "Tasks", "database"),
        ];
        let mut pre = std::collections::HashMap::new();
        pre.insert("p1".to_string(), listed[0].clone());
        let selection = SelectionState::from_preselection(pre);

        let html = notion_picker_page(&listed, &selection);
        assert!(html.contains(r#"data-id="p1" data-name="Roadmap" data-type="page" checked"#));
        assert!(html.contains(r#"data-id="db1" data-name="Tasks" data-type="database" "#));
    }

    #[test]
    fn test_html_escaping() {
        let listed = vec![ResourceReference::new("x", "<script>alert(1)</script>", "page")];
        let html = notion_picker_page(&listed, &SelectionState::new());
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_error_page_carries_message() {
        let report = ErrorReport::new("TOKEN_ERROR", "exchange rejected");
        let html = flow_error_page(&report);
        assert!(html.contains("exchange rejected"));
    }
}
