use bibtree::{
    split_list, split_name, ClassSet, Collector, Context, ErrorClass, Metatype, NodeKind, Options,
};

fn collecting_context() -> (Context, Collector) {
    let collector = Collector::new();
    let ctx = Context::with_sink(Box::new(collector.clone()));
    (ctx, collector)
}

#[test]
fn full_processing_strips_expands_and_pastes() {
    let mut ctx = Context::new();
    let outcome = ctx
        .parse_file_str(
            "@string{tcs = \"Theor. Comput. Sci.\"}\n\
             @article{lamport86,\n\
               journal = tcs,\n\
               title   = {Some   Spaced} # \", Title\",\n\
               year    = 1986,\n\
             }",
            Some("refs.bib"),
            Options::FULL,
        )
        .unwrap();
    assert!(outcome.ok);

    let tree = outcome.tree.unwrap();
    let string_entry = tree.next_entry(None).unwrap();
    assert_eq!(tree.entry_metatype(string_entry), Metatype::MacroDef);
    let article = tree.next_entry(Some(string_entry)).unwrap();
    assert_eq!(tree.entry_type(article), Some("article"));
    assert_eq!(tree.entry_key(article), Some("lamport86"));

    let (journal, name) = tree.next_field(article, None).unwrap();
    assert_eq!(name, "journal");
    let (_, kind, text) = tree.next_value(journal, None).unwrap();
    assert_eq!(kind, NodeKind::String);
    assert_eq!(text, "Theor. Comput. Sci.");

    let (title, _) = tree.next_field(article, Some(journal)).unwrap();
    let (_, _, text) = tree.next_value(title, None).unwrap();
    assert_eq!(text, "Some Spaced, Title");

    let (year, _) = tree.next_field(article, Some(title)).unwrap();
    let (_, kind, text) = tree.next_value(year, None).unwrap();
    assert_eq!(kind, NodeKind::Number);
    assert_eq!(text, "1986");
}

#[test]
fn minimal_options_leave_macros_unexpanded() {
    let mut ctx = Context::new();
    let outcome = ctx
        .parse_file_str("@misc{k, month = jan # {~1st}}", None, Options::MINIMAL)
        .unwrap();
    let tree = outcome.tree.unwrap();
    let entry = tree.first_entry().unwrap();
    let (field, _) = tree.next_field(entry, None).unwrap();
    let (v1, kind, text) = tree.next_value(field, None).unwrap();
    assert_eq!(kind, NodeKind::Macro);
    assert_eq!(text, "jan");
    let (_, kind, text) = tree.next_value(field, Some(v1)).unwrap();
    assert_eq!(kind, NodeKind::String);
    assert_eq!(text, "~1st");
}

#[test]
fn get_text_is_a_pure_query_on_minimal_trees() {
    let mut ctx = Context::new();
    ctx.define_macro("pub", "Addison-Wesley".to_string(), None, None, None);
    let outcome = ctx
        .parse_file_str("@book{k, publisher = pub # { Inc.}}", None, Options::MINIMAL)
        .unwrap();
    let tree = outcome.tree.unwrap();
    let entry = tree.first_entry().unwrap();
    let (field, _) = tree.next_field(entry, None).unwrap();

    let text = tree.get_text(&mut ctx, field).unwrap();
    assert_eq!(text, "Addison-WesleyInc.");
    // Repeatable, and the raw tree is untouched.
    assert_eq!(tree.get_text(&mut ctx, field).unwrap(), text);
    let (_, kind, raw) = tree.next_value(field, None).unwrap();
    assert_eq!(kind, NodeKind::Macro);
    assert_eq!(raw, "pub");
}

#[test]
fn undefined_macro_expands_empty_with_warning() {
    let (mut ctx, collector) = collecting_context();
    let outcome = ctx
        .parse_file_str("@misc{k, month = nosuch}", Some("refs.bib"), Options::FULL)
        .unwrap();
    assert!(outcome.ok);
    assert!(outcome.classes.contains(ClassSet::CONTENT));

    let tree = outcome.tree.unwrap();
    let entry = tree.first_entry().unwrap();
    let (field, _) = tree.next_field(entry, None).unwrap();
    let (_, _, text) = tree.next_value(field, None).unwrap();
    assert_eq!(text, "");

    let diags = collector.diagnostics();
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].class, ErrorClass::Content);
    assert_eq!(diags[0].message, "undefined macro \"nosuch\"");
    assert_eq!(diags[0].source.as_deref(), Some("refs.bib"));
}

#[test]
fn macro_redefinition_warns_and_wins() {
    let (mut ctx, collector) = collecting_context();
    let outcome = ctx
        .parse_file_str(
            "@string{me = \"Greg Ward\"}@string{me = \"Gregory P. Ward\"}",
            None,
            Options::FULL,
        )
        .unwrap();
    assert!(outcome.ok);
    assert_eq!(ctx.macros().lookup("me"), Some("Gregory P. Ward"));
    let diags = collector.diagnostics();
    assert_eq!(diags.len(), 1);
    assert_eq!(
        diags[0].message,
        "overriding existing definition of macro \"me\""
    );
}

#[test]
fn malformed_entry_is_skipped_and_the_rest_survive() {
    let (mut ctx, collector) = collecting_context();
    let outcome = ctx
        .parse_file_str(
            "@misc{a, t = {one}}\n\
             @misc{broken, t = = {two}}\n\
             @misc{c, t = {three}}",
            Some("refs.bib"),
            Options::FULL,
        )
        .unwrap();
    assert!(!outcome.ok);
    assert!(outcome.classes.contains(ClassSet::SYNTAX));
    assert_eq!(collector.count(ErrorClass::Syntax), 1);

    let tree = outcome.tree.unwrap();
    let mut keys = Vec::new();
    let mut entry = tree.next_entry(None);
    while let Some(e) = entry {
        keys.push(tree.entry_key(e).map(str::to_owned));
        entry = tree.next_entry(Some(e));
    }
    assert_eq!(
        keys,
        vec![Some("a".to_string()), Some("c".to_string())]
    );
}

#[test]
fn runaway_string_fails_the_entry() {
    let (mut ctx, collector) = collecting_context();
    let outcome = ctx
        .parse_entry("@misc{k, t = {never closed", Some("refs.bib"), 10, Options::FULL)
        .unwrap();
    assert!(!outcome.ok);
    assert!(outcome.tree.is_none());
    assert!(outcome.classes.contains(ClassSet::LEX_ERROR));
    let diags = collector.diagnostics();
    assert!(diags
        .iter()
        .any(|d| d.message == "runaway string, started at line 10"));
}

#[test]
fn entries_iterator_reports_per_entry_outcomes() {
    let mut ctx = Context::new();
    let outcomes: Vec<_> = ctx
        .entries(
            "@misc{a, t = {1}} @misc{bad = } @misc{b, t = {2}}",
            None,
            Options::FULL,
        )
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].ok);
    assert!(!outcomes[1].ok);
    assert!(outcomes[1].tree.is_none());
    assert!(outcomes[2].ok);
}

#[test]
fn author_field_splits_into_names() {
    let (mut ctx, _) = collecting_context();
    let outcome = ctx
        .parse_file_str(
            "@book{k, author = {Fontaine, Jean de la and Leacock, Stephen}}",
            Some("refs.bib"),
            Options::FULL,
        )
        .unwrap();
    let tree = outcome.tree.unwrap();
    let entry = tree.first_entry().unwrap();
    let (field, _) = tree.next_field(entry, None).unwrap();
    let (_, _, text) = tree.next_value(field, None).unwrap();

    let list = split_list(&mut ctx, text, "and", tree.source(), None, "name");
    assert_eq!(list.len(), 2);

    let first = split_name(&mut ctx, list.get(0).unwrap(), tree.source(), None, 0);
    assert_eq!(first.last(), vec!["Fontaine"]);
    assert_eq!(first.first(), vec!["Jean"]);
    assert_eq!(first.von(), vec!["de", "la"]);

    let second = split_name(&mut ctx, list.get(1).unwrap(), tree.source(), None, 1);
    assert_eq!(second.last(), vec!["Leacock"]);
    assert_eq!(second.first(), vec!["Stephen"]);
}

#[test]
fn case_conventions() {
    let mut ctx = Context::new();
    let outcome = ctx
        .parse_file_str(
            "@ARTICLE{MixedKey, YEAR = 2000}@STRING{JAN = {January}}",
            None,
            Options::FULL,
        )
        .unwrap();
    let tree = outcome.tree.unwrap();
    let entry = tree.first_entry().unwrap();
    assert_eq!(tree.entry_type(entry), Some("article"));
    assert_eq!(tree.entry_key(entry), Some("MixedKey"));
    let (_, name) = tree.next_field(entry, None).unwrap();
    assert_eq!(name, "year");
    assert!(ctx.macros().is_defined("JAN"));
    assert!(!ctx.macros().is_defined("jan"));
}

#[test]
fn parenthesized_entries_protect_the_closer_in_strings() {
    let mut ctx = Context::new();
    let outcome = ctx
        .parse_file_str(
            "@misc(key, note = \"a {)} b\")",
            None,
            Options::FULL,
        )
        .unwrap();
    assert!(outcome.ok);
    let tree = outcome.tree.unwrap();
    let entry = tree.first_entry().unwrap();
    assert_eq!(tree.entry_key(entry), Some("key"));
    let (field, _) = tree.next_field(entry, None).unwrap();
    let (_, _, text) = tree.next_value(field, None).unwrap();
    assert_eq!(text, "a {)} b");
}

#[test]
fn preamble_options_are_configurable() {
    let mut ctx = Context::new();
    ctx.set_string_options(Metatype::Preamble, Options::FULL);
    let outcome = ctx
        .parse_file_str(
            "@preamble{ \"\\nopagenumbers\" # \"{}\" }",
            None,
            Options::FULL,
        )
        .unwrap();
    let tree = outcome.tree.unwrap();
    let entry = tree.first_entry().unwrap();
    assert_eq!(tree.entry_metatype(entry), Metatype::Preamble);
    let (_, _, text) = tree.next_value(entry, None).unwrap();
    assert_eq!(text, "\\nopagenumbers{}");
}
