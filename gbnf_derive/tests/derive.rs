use gbnf_derive::Gbnf;

#[allow(dead_code)]
#[derive(Gbnf)]
#[gbnf(rename_all = "camelCase")]
struct PlaceSeed {
    display_name: String,
    parent_id: Option<String>,
    aliases: Vec<String>,
}

#[allow(dead_code)]
#[derive(Gbnf)]
struct Assignment {
    name: String,
    #[gbnf(one_of("original", "new"))]
    destination: String,
}

#[allow(dead_code)]
#[derive(Gbnf)]
struct Assignments {
    assignments: Vec<Assignment>,
}

#[test]
fn camel_case_field_names() {
    let grammar = PlaceSeed::to_grammar();
    assert!(grammar.starts_with("root ::= PlaceSeed"));
    assert!(grammar.contains(r#""\"displayName\":""#));
    assert!(grammar.contains(r#""\"parentId\":"   ws   stringOrNull"#));
    assert!(grammar.contains("stringList ::= "));
}

#[test]
fn one_of_fields_are_limited() {
    let grammar = Assignments::to_grammar();
    assert!(grammar.contains("AssignmentList ::= "));
    assert!(grammar.contains(r#"AssignmentDestinationValue ::= "\"original\"" | "\"new\"""#));
    assert!(grammar.contains(r#""\"destination\":"   ws   AssignmentDestinationValue"#));
}
