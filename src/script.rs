//! The markup convention used to patch deferred blocks into the page.
//!
//! Each deferred block is first written as a placeholder
//!
//! ```html
//! <div id="B:{run}" data-sf>{fallback}</div>
//! ```
//!
//! and, once its content is known, followed later in the same document by
//!
//! ```html
//! <template id="N:{run}" data-sr>{content}</template><script id="S:{run}" data-ss>$RC({run})</script>
//! ```
//!
//! where `$RC` is defined by [`SUSPENSE_SCRIPT`], sent at most once per
//! request right before the first patch.

/// Element id of the `<script>` carrying [`SUSPENSE_SCRIPT`], so that a
/// page which already includes the script can be detected.
pub const SCRIPT_ELEMENT_ID: &str = "ssr-suspense";

/// Name of the global function defined by [`SUSPENSE_SCRIPT`].
pub const APPLY_FN: &str = "$RC";

/// The client side half of the protocol.
///
/// `$RC(i)` swaps placeholder `B:i` for the contents of template `N:i` and
/// removes the template along with its `S:i` script.  If either side is not
/// in the document yet it does nothing and reports `false`.  After every
/// successful swap all templates still waiting are retried, since the
/// placeholder of a nested block only enters the document once the
/// template of its parent was applied.
pub const SUSPENSE_SCRIPT: &str = concat!(
    r#"<script id="ssr-suspense">"#,
    "function $RC(i){",
    "var d=document,",
    "b=d.querySelector('div[id=\"B:'+i+'\"][data-sf]'),",
    "n=d.querySelector('template[id=\"N:'+i+'\"][data-sr]'),",
    "s=d.querySelector('script[id=\"S:'+i+'\"][data-ss]'),",
    "f,c,p,k,m;",
    "if(!b||!n||!s)return!1;",
    "f=d.createDocumentFragment();",
    "while(c=n.content.firstChild)f.appendChild(c);",
    "b.parentNode.replaceChild(f,b);",
    "n.remove();s.remove();",
    "do{m=0;p=d.querySelectorAll('template[id^=\"N:\"][data-sr]');",
    "for(k=0;k<p.length;k++)if($RC(p[k].id.slice(2)))m=1",
    "}while(m);",
    "return!0}",
    "</script>",
);

/// Wraps the fallback of block `run`.
pub fn placeholder(run: u64, fallback: &str) -> String {
    format!(r#"<div id="B:{run}" data-sf>{fallback}</div>"#)
}

/// The replacement template for block `run` together with the script
/// applying it.
pub fn patch(run: u64, html: &str) -> String {
    format!(
        r#"<template id="N:{run}" data-sr>{html}</template><script id="S:{run}" data-ss>{APPLY_FN}({run})</script>"#
    )
}
