use crate::validate::{
    ERR_ARRAY_ASSIGNMENT, ERR_COMPOUND_PATTERN, ERR_LABELLED_JUMP, ERR_PATTERN_MEMBER,
    ERR_PATTERN_NO_INIT, ERR_TAGGED_TEMPLATE,
};
use crate::{lower_source, CompileError, TransformOptions};

fn lower(source: &str) -> String {
    lower_source(source, "test.js", &TransformOptions::default()).unwrap()
}

fn lower_err(source: &str) -> CompileError {
    lower_source(source, "test.js", &TransformOptions::default()).unwrap_err()
}

// ── let / const ────────────────────────────────────────────────────────────────

#[test]
fn test_let_and_const_become_var() {
    assert_eq!(lower("let x = 1;"), "var x = 1;");
    assert_eq!(lower("const x = 1;"), "var x = 1;");
}

#[test]
fn test_untouched_source_is_byte_identical() {
    let source = "var x = 1; // keep\nfunction f () { return x; }\n";
    assert_eq!(lower(source), source);
}

#[test]
fn test_shadowed_block_binding_is_renamed() {
    let result = lower("let x = 1;\n{\n\tlet x = 2;\n\tconsole.log( x );\n}\nconsole.log( x );");
    assert_eq!(
        result,
        "var x = 1;\n{\n\tvar x$1 = 2;\n\tconsole.log( x$1 );\n}\nconsole.log( x );"
    );
}

#[test]
fn test_uninitialized_let_in_loop_body_gets_reset() {
    let result = lower(
        "for ( let i = 0; i < 10; i += 1 ) {\n\tlet something;\n\tif ( i % 2 ) something = true;\n\tconsole.log( something );\n}",
    );
    assert_eq!(
        result,
        "for ( var i = 0; i < 10; i += 1 ) {\n\tvar something = void 0;\n\tif ( i % 2 ) something = true;\n\tconsole.log( something );\n}"
    );
}

// ── destructuring declarators ──────────────────────────────────────────────────

#[test]
fn test_object_pattern_with_identifier_source() {
    assert_eq!(
        lower("var { x, y } = point;"),
        "var x = point.x, y = point.y;"
    );
}

#[test]
fn test_object_pattern_with_complex_source() {
    assert_eq!(
        lower("var { x, y } = getPoint();"),
        "var ref = getPoint(), x = ref.x, y = ref.y;"
    );
}

#[test]
fn test_object_pattern_with_default() {
    assert_eq!(
        lower("var { start, end = 100 } = getRange();"),
        "var ref = getRange(), start = ref.start, end = ref.end === undefined ? 100 : ref.end;"
    );
}

#[test]
fn test_renamed_keys() {
    assert_eq!(
        lower("var { a: one, b: two } = obj;"),
        "var one = obj.a, two = obj.b;"
    );
}

#[test]
fn test_array_pattern_with_holes() {
    assert_eq!(
        lower("var [ x, , z ] = point;"),
        "var x = point[0], z = point[2];"
    );
}

#[test]
fn test_empty_pattern_keeps_single_evaluation() {
    assert_eq!(lower("var {} = foo();"), "var ref = foo();");
    assert_eq!(lower("var [ , , ] = bar();"), "var ref = bar();");
}

#[test]
fn test_pattern_in_loop_head() {
    let result = lower(
        "var range = { start: 10, end: 20 };\nfor ( let { start: i, end } = range; i < end; i += 1 ) {\n\tconsole.log( i );\n}",
    );
    assert!(result.contains("for ( var i = range.start, end = range.end; i < end; i += 1 ) {"));
}

#[test]
fn test_pattern_in_loop_head_with_complex_source() {
    let result = lower(
        "for ( let { start: i, end = 100 } = range(); i < end; i += 1 ) {\n\tconsole.log( i );\n}",
    );
    assert!(result.contains(
        "for ( var ref = range(), i = ref.start, end = ref.end === undefined ? 100 : ref.end; i < end; i += 1 ) {"
    ));
}

// ── destructured parameters ────────────────────────────────────────────────────

#[test]
fn test_object_pattern_parameter() {
    let result = lower("function pythag ( { x, y: z = 1 } ) {\n\treturn Math.sqrt( x * x + z * z );\n}");
    assert_eq!(
        result,
        "function pythag ( ref ) {\n\tvar x = ref.x;\n\tvar ref_y = ref.y, z = ref_y === void 0 ? 1 : ref_y;\n\n\treturn Math.sqrt( x * x + z * z );\n}"
    );
}

#[test]
fn test_array_pattern_parameter() {
    let result = lower("function pythag ( [ x, z = 1 ] ) {\n\treturn Math.sqrt( x * x + z * z );\n}");
    assert!(result.contains("function pythag ( ref ) {"));
    assert!(result.contains("var x = ref[0];"));
    assert!(result.contains("var ref_1 = ref[1], z = ref_1 === void 0 ? 1 : ref_1;"));
}

#[test]
fn test_two_pattern_parameters_get_distinct_refs() {
    let result = lower("function join ( { a }, { b } ) {\n\treturn a + b;\n}");
    assert!(result.contains("function join ( ref, ref$1 ) {"));
    assert!(result.contains("var a = ref.a;"));
    assert!(result.contains("var b = ref$1.b;"));
}

// ── loop closures ──────────────────────────────────────────────────────────────

#[test]
fn test_loop_with_closure_is_wrapped() {
    let result = lower(
        "for ( let i = 0; i < 10; i += 1 ) {\n\tconst square = i * i;\n\tsetTimeout( function () {\n\t\tlog( square );\n\t}, i * 100 );\n}",
    );
    assert_eq!(
        result,
        "var loop = function ( i ) {\n\tvar square = i * i;\n\tsetTimeout( function () {\n\t\tlog( square );\n\t}, i * 100 );\n};\n\nfor ( var i = 0; i < 10; i += 1 ) loop( i );"
    );
}

#[test]
fn test_loop_without_closure_is_not_wrapped() {
    let result = lower(
        "for ( let i = 0; i < 10; i += 1 ) {\n\tconst square = i * i;\n\tconsole.log( square );\n}",
    );
    assert_eq!(
        result,
        "for ( var i = 0; i < 10; i += 1 ) {\n\tvar square = i * i;\n\tconsole.log( square );\n}"
    );
}

#[test]
fn test_blockless_loop_body_is_wrapped_with_braces() {
    let result =
        lower("for ( let i = 0; i < 10; i += 1 ) setTimeout( function () { log( i ); }, i * 100 );");
    assert_eq!(
        result,
        "var loop = function ( i ) {\n\tsetTimeout( function () { log( i ); }, i * 100 );\n};\n\nfor ( var i = 0; i < 10; i += 1 ) loop( i );"
    );
}

#[test]
fn test_nested_wrapped_loops_forward_returns() {
    let result = lower(
        "function find( list ) {\n\tfor ( let i = 0; i < list.length; i += 1 ) {\n\t\tfor ( let j = 0; j < list.length; j += 1 ) {\n\t\t\tsetTimeout( function () { log( i, j ); } );\n\t\t\tif ( list[i][j] ) { return list[i][j]; }\n\t\t}\n\t}\n}",
    );
    assert_eq!(
        result,
        "function find( list ) {\n\tvar loop = function ( i ) {\n\t\tvar loop$1 = function ( j ) {\n\t\t\tsetTimeout( function () { log( i, j ); } );\n\t\t\tif ( list[i][j] ) { return { v: list[i][j] }; }\n\t\t};\n\n\t\tfor ( var j = 0; j < list.length; j += 1 ) {\n\t\t\tvar returned$1 = loop$1( j );\n\n\t\t\tif ( returned$1 ) return { v: returned$1.v };\n\t\t}\n\t};\n\n\tfor ( var i = 0; i < list.length; i += 1 ) {\n\t\tvar returned = loop( i );\n\n\t\tif ( returned ) return returned.v;\n\t}\n}"
    );
}

#[test]
fn test_blockless_body_that_is_itself_a_wrapped_loop() {
    let result = lower(
        "for ( let i = 0; i < 5; i += 1 ) for ( let j = 0; j < 5; j += 1 ) {\n\tsetTimeout( function () {\n\t\tlog( i, j );\n\t} );\n}",
    );
    assert_eq!(
        result,
        "var loop = function ( i ) {\n\tvar loop$1 = function ( j ) {\n\tsetTimeout( function () {\n\t\tlog( i, j );\n\t} );\n};\n\nfor ( var j = 0; j < 5; j += 1 ) loop$1( j );\n};\n\nfor ( var i = 0; i < 5; i += 1 ) loop( i );"
    );
}

#[test]
fn test_control_flow_sentinels() {
    let result = lower(
        "function foo () {\n\tfor ( let i = 0; i < 10; i += 1 ) {\n\t\tif ( i % 2 ) continue;\n\t\tif ( i > 5 ) break;\n\t\tif ( i === 8 ) return 'wow';\n\t\tsetTimeout( function () {\n\t\t\tlog( i );\n\t\t}, i * 100 );\n\t}\n}",
    );
    assert!(result.contains("var loop = function ( i ) {"));
    assert!(result.contains("if ( i % 2 ) return;"));
    assert!(result.contains("if ( i > 5 ) return 'break';"));
    assert!(result.contains("if ( i === 8 ) return { v: 'wow' };"));
    assert!(result.contains("var returned = loop( i );"));
    assert!(result.contains("if ( returned === 'break' ) break;"));
    assert!(result.contains("if ( returned ) return returned.v;"));
}

#[test]
fn test_bare_return_sentinel() {
    let result = lower(
        "function foo () {\n\tfor ( let i = 0; i < 10; i += 1 ) {\n\t\tif ( i === 8 ) return;\n\t\tsetTimeout( function () {\n\t\t\tlog( i );\n\t\t}, 100 );\n\t}\n}",
    );
    assert!(result.contains("if ( i === 8 ) return {};"));
    assert!(result.contains("if ( returned ) return returned.v;"));
    assert!(!result.contains("'break'"));
}

#[test]
fn test_this_and_arguments_are_aliased() {
    let result = lower(
        "function outer () {\n\tfor ( let i = 0; i < 10; i += 1 ) {\n\t\tsetTimeout( function () {\n\t\t\tlog( this, arguments, i );\n\t\t}, i * 100 );\n\t\tconsole.log( this, arguments, i );\n\t}\n}",
    );
    assert!(result.contains("var arguments$1 = arguments;"));
    assert!(result.contains("var this$1 = this;"));
    assert!(result.contains("console.log( this$1, arguments$1, i );"));
    // The nested function rebinds both, so its references stay put.
    assert!(result.contains("log( this, arguments, i );"));
}

#[test]
fn test_mutated_head_binding_gets_write_back() {
    let result = lower(
        "var fns = [];\nfor ( let i = 0; i < 10; i += 1 ) {\n\tfns.push( function () {\n\t\treturn i;\n\t} );\n\ti += 1;\n}",
    );
    assert!(result.contains("var loop = function ( i$1 ) {"));
    assert!(result.contains("return i$1;"));
    assert!(result.contains("i$1 += 1;"));
    assert!(result.contains("i = i$1;"));
    assert!(result.contains("for ( var i = 0; i < 10; i += 1 ) loop( i );"));
}

#[test]
fn test_mutated_head_binding_with_outer_conflict() {
    let result = lower(
        "var fns = [];\nlet i = 999;\nfor ( let i = 0; i < 10; i += 1 ) {\n\tfns.push( function () {\n\t\treturn i;\n\t} );\n\ti += 1;\n}\nconsole.log( i );",
    );
    assert!(result.contains("var i = 999;"));
    assert!(result.contains("var loop = function ( i$2 ) {"));
    assert!(result.contains("return i$2;"));
    assert!(result.contains("i$1 = i$2;"));
    assert!(result.contains("for ( var i$1 = 0; i$1 < 10; i$1 += 1 ) loop( i$1 );"));
    assert!(result.contains("console.log( i );"));
}

#[test]
fn test_while_loop_wrapper_takes_no_params() {
    let result = lower(
        "var i = 10;\nwhile ( i-- ) {\n\tconst square = i * i;\n\tsetTimeout( function () {\n\t\tlog( square );\n\t}, square );\n}",
    );
    assert!(result.contains("var loop = function () {"));
    assert!(result.contains("while ( i-- ) loop();"));
}

#[test]
fn test_do_while_loop_call_site() {
    let result = lower(
        "var i = 10;\ndo {\n\tconst square = i * i;\n\tsetTimeout( function () {\n\t\tlog( square );\n\t}, square );\n} while ( i-- );",
    );
    assert!(result.contains("var loop = function () {"));
    assert!(result.contains("do {\n\tloop();\n} while ( i-- );"));
}

#[test]
fn test_for_in_wrapper() {
    let result = lower(
        "for ( let foo in bar ) {\n\tsetTimeout( function () {\n\t\tlog( foo );\n\t}, 100 );\n}",
    );
    assert!(result.contains("var loop = function ( foo ) {"));
    assert!(result.contains("for ( var foo in bar ) loop( foo );"));
}

#[test]
fn test_for_of_wrapper() {
    let result = lower(
        "for ( let foo of bar ) {\n\tsetTimeout( function () {\n\t\tlog( foo );\n\t}, 100 );\n}",
    );
    assert!(result.contains("var loop = function ( foo ) {"));
    assert!(result.contains("for ( var foo of bar ) loop( foo );"));
}

#[test]
fn test_break_inside_switch_is_not_rewritten() {
    let result = lower(
        "for ( let i = 0; i < 3; i += 1 ) {\n\tswitch ( i ) {\n\t\tcase 0:\n\t\t\tbreak;\n\t}\n\tsetTimeout( function () {\n\t\tlog( i );\n\t}, 100 );\n}",
    );
    assert!(result.contains("break;"));
    assert!(!result.contains("'break'"));
}

#[test]
fn test_return_inside_nested_function_is_not_rewritten() {
    let result = lower(
        "for ( let i = 0; i < 3; i += 1 ) {\n\tvar f = function () {\n\t\treturn i * 2;\n\t};\n\tsetTimeout( f, 100 );\n}",
    );
    assert!(result.contains("return i * 2;"));
    assert!(!result.contains("{ v:"));
}

// ── options ────────────────────────────────────────────────────────────────────

#[test]
fn test_disabled_let_const_leaves_source_alone() {
    let options: TransformOptions = serde_json::from_str(r#"{ "letConst": false }"#).unwrap();
    let source =
        "for ( let i = 0; i < 10; i += 1 ) {\n\tsetTimeout( function () {\n\t\tlog( i );\n\t}, 100 );\n}";
    assert_eq!(lower_source(source, "test.js", &options).unwrap(), source);
}

#[test]
fn test_disabled_destructuring_leaves_patterns_alone() {
    let options: TransformOptions =
        serde_json::from_str(r#"{ "destructuring": false }"#).unwrap();
    let source = "var { x, y } = point;";
    assert_eq!(lower_source(source, "test.js", &options).unwrap(), source);
}

#[test]
fn test_disabled_parameter_destructuring_leaves_params_alone() {
    let options: TransformOptions =
        serde_json::from_str(r#"{ "parameterDestructuring": false }"#).unwrap();
    let source = "function pythag ( { x, y } ) {\n\treturn x + y;\n}";
    assert_eq!(lower_source(source, "test.js", &options).unwrap(), source);
}

// ── rejected constructs ────────────────────────────────────────────────────────

#[test]
fn test_compound_pattern_is_rejected() {
    let error = lower_err("var { a: { b } } = obj;");
    assert_eq!(error.code, ERR_COMPOUND_PATTERN);
    assert!(error.message.contains("Compound destructuring is not supported"));
}

#[test]
fn test_array_assignment_is_rejected() {
    let error = lower_err("[ a, b ] = c;");
    assert_eq!(error.code, ERR_ARRAY_ASSIGNMENT);
    assert!(error.message.contains("not currently supported"));
}

#[test]
fn test_tagged_template_is_rejected() {
    let error = lower_err("var a = tag`str`;");
    assert_eq!(error.code, ERR_TAGGED_TEMPLATE);
    assert!(error.message.contains("Tagged template expressions are not supported"));
}

#[test]
fn test_rest_element_is_rejected() {
    let error = lower_err("var { a, ...rest } = obj;");
    assert_eq!(error.code, ERR_PATTERN_MEMBER);
}

#[test]
fn test_pattern_without_initializer_is_rejected() {
    let error = lower_err("for ( let { x } in obj ) {}");
    assert_eq!(error.code, ERR_PATTERN_NO_INIT);
}

#[test]
fn test_labelled_jump_across_wrapper_is_rejected() {
    let error = lower_err(
        "outer: for ( let i = 0; i < 10; i += 1 ) {\n\tfor ( let j = 0; j < 10; j += 1 ) {\n\t\tif ( j === i ) continue outer;\n\t\tsetTimeout( function () {\n\t\t\tlog( i, j );\n\t\t}, 100 );\n\t}\n}",
    );
    assert_eq!(error.code, ERR_LABELLED_JUMP);
}

#[test]
fn test_error_reports_location_and_guarantee() {
    let error = lower_err("var x = 1;\nvar { a: { b } } = obj;");
    assert_eq!((error.line, error.column), (2, 5));
    let json = serde_json::to_string(&error).unwrap();
    assert!(json.contains("\"code\""));
    assert!(json.contains("\"guarantee\""));
}
