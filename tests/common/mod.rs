#![allow(dead_code)]

use clap::Parser;
use trellis::config::{self, CliArgs, Settings};
use trellis::infra::bootstrap::{ApplicationContext, build_application};
use trellis::infra::content::ContentArchive;

pub const HOST: &str = "example.com";

/// One site with `en`, `fr` and a hidden `de`.
///
/// `/about` only exists in French. `/contact` carries two timed fragments,
/// `/live` an uncacheable one, `/old` an explicit redirect and `/loop` a
/// redirect pointing at itself.
pub fn archive_text(redirect_on_fallback: bool) -> String {
    format!(
        r#"
[[sites]]
id = 1
domain = "{HOST}"
name = "Example"
timezone = "Europe/Paris"

[[sites.languages]]
code = "en"
fallbacks = ["fr"]
redirect_on_fallback = {redirect_on_fallback}

[[sites.languages]]
code = "fr"
fallbacks = ["en"]

[[sites.languages]]
code = "de"
public = false

[[pages]]
id = "home"
site = 1
is_home = true

[[pages.contents]]
language = "en"
title = "Welcome"
published = true

[[pages.contents.placeholders]]
slot = "content"
body = "<p>Hello</p>"

[[pages.contents]]
language = "fr"
title = "Bienvenue"
published = true

[[pages]]
id = "about"
site = 1
parent = "home"
position = 1

[[pages.contents]]
language = "fr"
slug = "about"
title = "A propos"
published = true

[[pages.contents.placeholders]]
slot = "content"
body = "<p>Qui sommes-nous</p>"
cache_ttl = 300

[[pages]]
id = "contact"
site = 1
parent = "home"
position = 2
xframe_options = "deny"

[[pages.contents]]
language = "en"
title = "Contact"
published = true

[[pages.contents.placeholders]]
slot = "form"
body = "<form></form>"
cache_ttl = 30
vary_on = ["Cookie"]

[[pages.contents.placeholders]]
slot = "map"
body = "<div>map</div>"
cache_ttl = 120

[[pages]]
id = "live"
site = 1
parent = "home"
position = 3

[[pages.contents]]
language = "en"
title = "Live"
published = true

[[pages.contents.placeholders]]
slot = "ticker"
body = "<p>now</p>"
cache_ttl = 0

[[pages]]
id = "members"
site = 1
parent = "home"
position = 4
login_required = true

[[pages.contents]]
language = "en"
title = "Members"
published = true

[[pages]]
id = "staff"
site = 1
parent = "home"
position = 5
view_users = ["ada"]

[[pages.contents]]
language = "en"
title = "Staff"
published = true

[[pages]]
id = "old"
site = 1
parent = "home"
position = 6

[[pages.contents]]
language = "en"
title = "Old"
redirect = "/contact/"
published = true

[[pages]]
id = "loop"
site = 1
parent = "home"
position = 7

[[pages.contents]]
language = "en"
title = "Loop"
redirect = "/en/loop/"
published = true

[[pages]]
id = "upcoming"
site = 1
parent = "home"
position = 8

[[pages.contents]]
language = "en"
title = "Upcoming"
revision = "draft"

[[pages.contents.placeholders]]
slot = "content"
body = "<p>Soon</p>"
"#
    )
}

pub fn archive(redirect_on_fallback: bool) -> ContentArchive {
    ContentArchive::parse(&archive_text(redirect_on_fallback)).expect("sample archive parses")
}

pub fn settings(extra: &[&str]) -> Settings {
    let mut args = vec!["trellis", "serve"];
    args.extend_from_slice(extra);
    config::load(&CliArgs::parse_from(args)).expect("settings load")
}

pub fn application(redirect_on_fallback: bool) -> ApplicationContext {
    build_application(&settings(&[]), archive(redirect_on_fallback)).expect("application builds")
}
