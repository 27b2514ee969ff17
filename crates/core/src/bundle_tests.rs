// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;

#[yare::parameterized(
    revision  = { "cs:app-1",            "cs",    "app",       Some(1) },
    series    = { "cs:trusty/mysql-42",  "cs",    "mysql",     Some(42) },
    no_rev    = { "local:thing",         "local", "thing",     None },
    dash_name = { "cs:my-app-7",         "cs",    "my-app",    Some(7) },
    word_tail = { "cs:my-app",           "cs",    "my-app",    None },
)]
fn bundle_url_parts(url: &str, schema: &str, name: &str, revision: Option<u32>) {
    let url: BundleUrl = url.parse().unwrap();
    assert_eq!(url.schema(), schema);
    assert_eq!(url.name(), name);
    assert_eq!(url.revision(), revision);
}

#[yare::parameterized(
    no_schema    = { "app-1" },
    empty_schema = { ":app-1" },
    bad_series   = { "cs:Trusty/app" },
    bad_name     = { "cs:App" },
    trailing     = { "cs:app-" },
    empty        = { "" },
)]
fn bundle_url_rejects(url: &str) {
    assert!(url.parse::<BundleUrl>().is_err());
}

#[test]
fn cache_name_is_path_safe() {
    let url: BundleUrl = "cs:trusty/mysql-42".parse().unwrap();
    assert_eq!(url.cache_name(), "cs_trusty_mysql-42");
}

fn arb_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,8}"
}

proptest! {
    #[test]
    fn generated_urls_parse_back(
        schema in "[a-z]{1,5}",
        series in proptest::option::of(arb_name()),
        name in arb_name(),
        revision in proptest::option::of(0u32..10_000),
    ) {
        let mut text = format!("{schema}:");
        if let Some(series) = &series {
            text.push_str(series);
            text.push('/');
        }
        text.push_str(&name);
        if let Some(rev) = revision {
            text.push_str(&format!("-{rev}"));
        }
        let url: BundleUrl = text.parse().unwrap();
        prop_assert_eq!(url.schema(), schema.as_str());
        prop_assert_eq!(url.name(), name.as_str());
        prop_assert_eq!(url.revision(), revision);
        prop_assert_eq!(url.to_string(), text);
    }
}
