//! Composition tests across the registry, runtime and evaluator.
//!
//! These cover nested invocation, parameter isolation, usage tracking and
//! cleanup after a failed render.

#[cfg(test)]
mod tests {
    use crate::{func, scope_class, CompileOptions, Error, FuncMap, Registry, RenderSession, Value};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn registry_with(components: &[(&str, &str)]) -> Registry {
        let registry = Registry::default();
        for (name, source) in components {
            registry.compile(name, source).unwrap();
        }
        registry
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // PARAMETER ISOLATION
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_sibling_invocations_see_only_their_own_args() {
        let registry = registry_with(&[
            ("e", r#"<template><main>{{comp "a" "outer"}}</main></template>"#),
            (
                "a",
                r#"<template><section>{{comp "b" "x"}}{{comp "b" "y"}}<em>{{param 0}}</em></section></template>"#,
            ),
            ("b", "<template><b>{{param 0}}</b></template>"),
        ]);

        let rendered = registry.render_fragment("e", &json!({})).unwrap();
        let (e, a, b) = (scope_class("e"), scope_class("a"), scope_class("b"));
        assert_eq!(
            rendered.html,
            format!(
                r#"<main class="{e}"><section class="{a}"><b class="{b}">x</b><b class="{b}">y</b><em>outer</em></section></main>"#,
                e = e,
                a = a,
                b = b
            )
        );
    }

    #[test]
    fn test_stack_is_balanced_after_invocations() {
        let registry = registry_with(&[
            ("a", r#"<template><div>{{comp "b" 1}}{{comp "b" 2}}</div></template>"#),
            ("b", "<template><i>{{param 0}}</i></template>"),
        ]);
        let session = RenderSession::new(&registry);
        session.invoke_component("a", vec![]).unwrap();
        assert_eq!(session.depth(), 0);
        assert_eq!(session.used_components(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_param_or_defaults() {
        let registry = registry_with(&[
            ("e", r#"<template><div>{{comp "greet" "Ada"}}{{comp "greet" nil}}</div></template>"#),
            ("greet", r#"<template><p>{{paramOr 0 "stranger"}}</p></template>"#),
        ]);
        let html = registry.render_fragment("e", &json!({})).unwrap().html;
        assert!(html.contains(">Ada</p>"));
        assert!(html.contains(">stranger</p>"));
    }

    #[test]
    fn test_named_args_through_dict() {
        let registry = registry_with(&[
            (
                "e",
                r#"<template><div>{{comp "card" (dict "title" .Title "count" 2)}}</div></template>"#,
            ),
            (
                "card",
                r#"<template><h3>{{.title}}: {{add .count 1}} {{index (param 0) "title"}}</h3></template>"#,
            ),
        ]);
        let html = registry
            .render_fragment("e", &json!({"Title": "News"}))
            .unwrap()
            .html;
        assert!(html.contains(">News: 3 News</h3>"));
    }

    #[test]
    fn test_dict_errors_abort_render() {
        let registry = registry_with(&[
            ("odd", r#"<template><div>{{comp "card" (dict "title")}}</div></template>"#),
            ("nonkey", r#"<template><div>{{comp "card" (dict 1 2)}}</div></template>"#),
            ("card", "<template><h3>{{.title}}</h3></template>"),
        ]);
        assert!(matches!(registry.render_fragment("odd", &json!({})), Err(Error::Dict(_))));
        assert!(matches!(registry.render_fragment("nonkey", &json!({})), Err(Error::Dict(_))));
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // USAGE TRACKING
    // ═══════════════════════════════════════════════════════════════════════════════

    fn chain_registry() -> Registry {
        registry_with(&[
            ("e", r#"<template><div>{{comp "f"}}</div></template><style>div{a:e}</style>"#),
            ("f", r#"<template><p>{{comp "g.html"}}</p></template><style>p{a:f}</style>"#),
            (
                "g",
                "<template><span>g</span></template><style>span{a:g}</style><script>g()</script>",
            ),
            ("h", "<template><i>h</i></template><style>i{a:h}</style><script>h()</script>"),
            ("nav", "<template><nav>menu</nav></template><style>nav{a:nav}</style>"),
        ])
    }

    #[test]
    fn test_aggregates_exactly_the_reached_components() {
        let registry = chain_registry();
        let rendered = registry.render_fragment("e", &json!({})).unwrap();

        assert_eq!(rendered.used, vec!["e".to_string(), "f".to_string(), "g".to_string()]);
        assert_eq!(
            rendered.assets.css,
            format!(
                "div.{}{{a:e}}\np.{}{{a:f}}\nspan.{}{{a:g}}\n",
                scope_class("e"),
                scope_class("f"),
                scope_class("g")
            )
        );
        assert_eq!(rendered.assets.js, "g()\n");
        assert!(!rendered.assets.css.contains("a:h"));
    }

    #[test]
    fn test_shell_references_are_aggregated_after_entry() {
        let registry = chain_registry();
        registry
            .compile_shell(
                "layout",
                "<html><head></head><body>{{comp \"nav\"}}{{.Content}}</body></html>",
            )
            .unwrap();

        let page = registry.render("e", &json!({})).unwrap();
        let css_start = page.find("<style>").unwrap();
        let css_end = page.find("</style>").unwrap();
        let css = &page[css_start..css_end];

        let order: Vec<usize> = ["a:e", "a:nav", "a:f", "a:g"]
            .iter()
            .map(|needle| css.find(needle).unwrap())
            .collect();
        assert!(order.windows(2).all(|w| w[0] < w[1]));
        assert!(!css.contains("a:h"));
        assert!(page.contains("<script>g()\n</script>"));
    }

    #[test]
    fn test_repeated_renders_are_identical() {
        let registry = chain_registry();
        let first = registry.render_fragment("e", &json!({})).unwrap();
        let second = registry.render_fragment("e", &json!({})).unwrap();
        assert_eq!(first, second);
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // FAILURES
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_failure_leaves_no_residue() {
        let registry = chain_registry();
        registry
            .compile("g", r#"<template><span>{{comp "missing"}}</span></template>"#)
            .unwrap();

        let err = registry.render_fragment("e", &json!({})).unwrap_err();
        assert!(matches!(err, Error::ComponentNotFound { ref name } if name == "missing"));

        let session = RenderSession::new(&registry);
        assert!(session.invoke_component("e", vec![]).is_err());
        assert_eq!(session.depth(), 0);

        let fresh = registry.render_fragment("h", &json!({})).unwrap();
        assert_eq!(fresh.used, vec!["h".to_string()]);
        assert_eq!(fresh.assets.js, "h()\n");
    }

    #[test]
    fn test_recursion_limit() {
        let options = CompileOptions {
            max_depth: 3,
            ..CompileOptions::default()
        };
        let registry = Registry::new(options);
        registry
            .compile("loop", r#"<template><i>{{comp "loop"}}</i></template>"#)
            .unwrap();

        let session = RenderSession::new(&registry);
        let err = session.invoke_component("loop", vec![]).unwrap_err();
        assert!(matches!(err, Error::RecursionLimit { ref name, depth: 3 } if name == "loop"));
        assert_eq!(session.depth(), 0);
    }

    #[test]
    fn test_unknown_entry_and_missing_shell() {
        let registry = chain_registry();
        assert!(matches!(
            registry.render("nope", &json!({})),
            Err(Error::ComponentNotFound { .. })
        ));
        assert!(matches!(registry.render("e", &json!({})), Err(Error::NoShell)));
    }

    #[test]
    fn test_evaluation_error_propagates() {
        let registry = registry_with(&[("e", "<template><p>{{ nosuch 1 }}</p></template>")]);
        let err = registry.render_fragment("e", &json!({})).unwrap_err();
        assert!(matches!(err, Error::Evaluation { .. }));
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // HELPERS & CONCURRENCY
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_custom_functions_reach_components_and_shell() {
        let registry = registry_with(&[("e", "<template><p>{{ shout .Name }}</p></template>")]);
        let mut funcs = FuncMap::new();
        funcs.insert(
            "shout".to_string(),
            func(|args| Ok(Value::Str(args.first().map(Value::to_text).unwrap_or_default().to_uppercase()))),
        );
        registry.add_funcs(funcs);
        registry
            .compile_shell(
                "layout",
                "<html><head><title>{{ shout .Data.Name }}</title></head><body>{{.Content}}</body></html>",
            )
            .unwrap();

        let page = registry.render("e", &json!({"Name": "ada"})).unwrap();
        assert!(page.contains("<title>ADA</title>"));
        assert!(page.contains(">ADA</p>"));
    }

    #[test]
    fn test_data_is_escaped_but_components_are_not() {
        let registry = registry_with(&[
            ("e", r#"<template><div>{{.Raw}}{{comp "b"}}</div></template>"#),
            ("b", "<template><b>ok</b></template>"),
        ]);
        let html = registry
            .render_fragment("e", &json!({"Raw": "<script>"}))
            .unwrap()
            .html;
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains(&format!("<b class=\"{}\">ok</b>", scope_class("b"))));
    }

    #[test]
    fn test_concurrent_renders_do_not_interfere() {
        let registry = registry_with(&[
            ("e", r#"<template><div>{{comp "b" .N}}</div></template>"#),
            ("b", "<template><b>{{param 0}}</b></template>"),
        ]);

        std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|n| {
                    let registry = &registry;
                    s.spawn(move || {
                        let rendered = registry.render_fragment("e", &json!({"N": n})).unwrap();
                        (n, rendered)
                    })
                })
                .collect();
            for handle in handles {
                let (n, rendered) = handle.join().unwrap();
                assert!(rendered.html.contains(&format!(">{}</b>", n)));
                assert_eq!(rendered.used, vec!["e".to_string(), "b".to_string()]);
            }
        });
    }
}
