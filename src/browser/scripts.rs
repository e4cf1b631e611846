//! JavaScript snippets evaluated in the page.
//!
//! Every snippet is an IIFE that returns `JSON.stringify({ ok })` or
//! `JSON.stringify({ error })`. Elements are handed to Rust as integer ids
//! from a registry on `window`, which disappears with the document. Every
//! query first drops detached elements from the registry so re-rendered
//! markup does not pile up; their ids read as stale from then on.

use crate::core::Query;
use crate::types::NodeHandle;

const PRELUDE: &str = r#"
    const H = (window.__trimscrape = window.__trimscrape || { next: 1, nodes: new Map(), ids: new WeakMap() });
    const reg = (el) => {
        let id = H.ids.get(el);
        if (id === undefined) { id = H.next++; H.ids.set(el, id); }
        H.nodes.set(id, el);
        return id;
    };
    const prune = () => {
        for (const [id, el] of H.nodes) { if (!el.isConnected) H.nodes.delete(id); }
    };
    const get = (id) => {
        const el = H.nodes.get(id);
        if (!el || !el.isConnected) throw new Error('stale:' + id);
        return el;
    };
"#;

fn wrap(body: &str) -> String {
    format!(
        r#"
        (function() {{
            {}
            try {{
                {}
            }} catch (e) {{
                return JSON.stringify({{ error: String((e && e.message) || e) }});
            }}
        }})()
        "#,
        PRELUDE, body
    )
}

fn literal(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

pub fn query(scope: Option<NodeHandle>, query: &Query) -> String {
    let root = match scope {
        Some(node) => format!("get({})", node.id()),
        None => "document".to_string(),
    };
    let body = match query {
        Query::Css(css) => format!(
            "prune();
             const root = {};
             return JSON.stringify({{ ok: Array.from(root.querySelectorAll({})).map(reg) }});",
            root,
            literal(css)
        ),
        Query::XPath(xpath) => format!(
            "prune();
             const root = {};
             const snap = document.evaluate({}, root, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
             const out = [];
             for (let i = 0; i < snap.snapshotLength; i++) {{
                 const n = snap.snapshotItem(i);
                 if (n.nodeType === 1) out.push(reg(n));
             }}
             return JSON.stringify({{ ok: out }});",
            root,
            literal(xpath)
        ),
    };
    wrap(&body)
}

pub fn inspect(node: NodeHandle) -> String {
    wrap(&format!(
        "const el = get({});
         const r = el.getBoundingClientRect();
         const s = window.getComputedStyle(el);
         const attributes = {{}};
         for (const a of el.attributes) attributes[a.name] = a.value;
         const text = el.innerText !== undefined ? el.innerText : (el.textContent || '');
         return JSON.stringify({{ ok: {{
             tag_name: el.tagName.toLowerCase(),
             text_content: text,
             attributes,
             rect: {{ x: r.left + window.scrollX, y: r.top + window.scrollY, width: r.width, height: r.height }},
             is_visible: r.width > 0 && r.height > 0 && s.display !== 'none'
                 && s.visibility !== 'hidden' && s.opacity !== '0',
             is_enabled: !el.disabled && el.getAttribute('aria-disabled') !== 'true'
         }} }});",
        node.id()
    ))
}

pub fn inner_html(node: NodeHandle) -> String {
    wrap(&format!(
        "return JSON.stringify({{ ok: get({}).innerHTML }});",
        node.id()
    ))
}

pub fn scroll_into_view(node: NodeHandle) -> String {
    wrap(&format!(
        "get({}).scrollIntoView({{ behavior: 'smooth', block: 'center' }});
         return JSON.stringify({{ ok: true }});",
        node.id()
    ))
}

/// Centre of the element in viewport coordinates, and whether the element
/// (or a descendant) is what a pointer there would hit.
pub fn hit_test(node: NodeHandle) -> String {
    wrap(&format!(
        "const el = get({});
         el.scrollIntoView({{ block: 'center', inline: 'center' }});
         const r = el.getBoundingClientRect();
         const x = r.left + r.width / 2;
         const y = r.top + r.height / 2;
         const top = document.elementFromPoint(x, y);
         const clear = !!top && (top === el || el.contains(top));
         const blocker = top && !clear ? top.tagName.toLowerCase() + (top.className ? '.' + String(top.className).split(' ').join('.') : '') : null;
         return JSON.stringify({{ ok: {{ x, y, clear, blocker }} }});",
        node.id()
    ))
}

pub fn click_programmatic(node: NodeHandle) -> String {
    wrap(&format!(
        "const el = get({});
         if (typeof el.click === 'function') el.click();
         else el.dispatchEvent(new MouseEvent('click', {{ bubbles: true, cancelable: true }}));
         return JSON.stringify({{ ok: true }});",
        node.id()
    ))
}

pub fn scroll_to(y: f64) -> String {
    wrap(&format!(
        "window.scrollTo(0, {});
         return JSON.stringify({{ ok: true }});",
        y.max(0.0)
    ))
}

pub fn page_height() -> String {
    wrap(
        "return JSON.stringify({ ok: Math.max(document.body ? document.body.scrollHeight : 0,
                                             document.documentElement.scrollHeight) });",
    )
}

pub const HIDE_WEBDRIVER: &str = r#"
    (function() {
        try {
            Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
        } catch (e) {}
        return true;
    })()
"#;
