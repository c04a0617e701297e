use odata_engine::ast::functions::{ArgumentOrder, supported};
use odata_engine::ast::{BinOp, Expr, reference, value};
use odata_engine::formatter::{ExpressionFormatter, FilterContext, FormatError, format_filter};
use odata_engine::metadata::{FieldKind, Schema};
use odata_engine::{ProtocolVersion, Value};

fn northwind() -> Schema {
    Schema::new("NorthwindModel")
        .field("Products", "ProductID", FieldKind::Other)
        .field("Products", "ProductName", FieldKind::String)
        .field("Products", "UnitPrice", FieldKind::Other)
        .navigation("Products", "Category", "Categories", false)
        .field("Categories", "CategoryID", FieldKind::Other)
        .field("Categories", "CategoryName", FieldKind::String)
        .navigation("Categories", "Products", "Products", true)
        .field("Orders", "OrderID", FieldKind::Other)
        .field("Orders", "OrderDate", FieldKind::Other)
        .field("Orders", "ShipAddress", FieldKind::Other)
}

fn format_v3(expr: &Expr) -> String {
    let schema = Schema::new("NS");
    ExpressionFormatter::new(&schema, ProtocolVersion::V3)
        .format(expr, None)
        .unwrap()
}

fn format_v4(expr: &Expr) -> String {
    let schema = Schema::new("NS");
    ExpressionFormatter::new(&schema, ProtocolVersion::V4)
        .format(expr, None)
        .unwrap()
}

fn format_in(expr: &Expr, collection: &str, version: ProtocolVersion) -> Result<String, FormatError> {
    let schema = northwind();
    let context = FilterContext {
        resolver: &schema,
        collection: Some(collection),
        version,
    };
    format_filter(expr, &context)
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    Expr::BinaryOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

// ============================================================================
// Function mapping
// ============================================================================

#[test]
fn test_contains_maps_to_substringof_in_v3() {
    let expr = reference("Name").contains(value("ai"));
    assert_eq!(format_v3(&expr), "substringof('ai',Name)");
}

#[test]
fn test_contains_maps_to_contains_in_v4() {
    let expr = reference("Name").contains(value("ai"));
    assert_eq!(format_v4(&expr), "contains(Name,'ai')");
}

#[test]
fn test_function_golden_table() {
    let cases: Vec<(Expr, &str, &str)> = vec![
        (reference("Name").starts_with("C"), "startswith(Name,'C')", "startswith(Name,'C')"),
        (reference("Name").ends_with("s"), "endswith(Name,'s')", "endswith(Name,'s')"),
        (reference("Name").index_of("a"), "indexof(Name,'a')", "indexof(Name,'a')"),
        (
            reference("Name").call("Replace", vec![value("a"), value("b")]),
            "replace(Name,'a','b')",
            "replace(Name,'a','b')",
        ),
        (reference("Name").substring(1), "substring(Name,1)", "substring(Name,1)"),
        (
            reference("Name").call("Substring", vec![value(1), value(2)]),
            "substring(Name,1,2)",
            "substring(Name,1,2)",
        ),
        (
            reference("Name").call("Concat", vec![value("x")]),
            "concat(Name,'x')",
            "concat(Name,'x')",
        ),
        (reference("Name").length(), "length(Name)", "length(Name)"),
        (reference("Name").to_lower(), "tolower(Name)", "tolower(Name)"),
        (reference("Name").to_upper(), "toupper(Name)", "toupper(Name)"),
        (reference("Name").trim(), "trim(Name)", "trim(Name)"),
        (reference("Born").year(), "year(Born)", "year(Born)"),
        (reference("Born").month(), "month(Born)", "month(Born)"),
        (reference("Born").day(), "day(Born)", "day(Born)"),
        (reference("Price").call("Round", vec![]), "round(Price)", "round(Price)"),
        (reference("Price").call("ceiling", vec![]), "ceiling(Price)", "ceiling(Price)"),
    ];

    for (expr, v3, v4) in cases {
        assert_eq!(format_v3(&expr), v3, "V3 formatting of {:?}", expr);
        assert_eq!(format_v4(&expr), v4, "V4 formatting of {:?}", expr);
    }
}

#[test]
fn test_every_supported_function_assembles_arguments_by_its_order() {
    for version in [ProtocolVersion::V3, ProtocolVersion::V4] {
        let schema = Schema::new("NS");
        let formatter = ExpressionFormatter::new(&schema, version);

        for (name, arity, descriptor) in supported(version) {
            let args: Vec<Expr> = (1..=arity as i32).map(|n| value(n)).collect();
            let expr = reference("T").call(name, args);

            let mut expected_args: Vec<String> = (1..=arity).map(|n| n.to_string()).collect();
            match descriptor.order {
                ArgumentOrder::TargetFirst => expected_args.insert(0, "T".to_string()),
                ArgumentOrder::TargetLast => expected_args.push("T".to_string()),
                ArgumentOrder::TargetOnly => expected_args = vec!["T".to_string()],
            }
            let expected = format!("{}({})", descriptor.protocol_name, expected_args.join(","));

            assert_eq!(formatter.format(&expr, None).unwrap(), expected, "{} {}/{}", version, name, arity);
        }
    }
}

#[test]
fn test_unknown_function_is_unsupported() {
    let schema = Schema::new("NS");
    let formatter = ExpressionFormatter::new(&schema, ProtocolVersion::V4);
    let err = formatter
        .format(&reference("Name").call("Frobnicate", vec![]), None)
        .unwrap_err();

    assert_eq!(
        err,
        FormatError::UnsupportedFunction {
            name: "Frobnicate".to_string(),
            arity: 0
        }
    );
}

#[test]
fn test_wrong_arity_is_unsupported() {
    let schema = Schema::new("NS");
    let formatter = ExpressionFormatter::new(&schema, ProtocolVersion::V3);
    let expr = reference("Name").call("Contains", vec![value("a"), value("b")]);

    assert!(matches!(
        formatter.format(&expr, None),
        Err(FormatError::UnsupportedFunction { arity: 2, .. })
    ));
}

#[test]
fn test_v4_only_function_is_unsupported_in_v3() {
    let schema = Schema::new("NS");
    let formatter = ExpressionFormatter::new(&schema, ProtocolVersion::V3);
    let expr = reference("Shipped").call("Date", vec![]);

    assert!(formatter.format(&expr, None).is_err());
    assert_eq!(format_v4(&expr), "date(Shipped)");
}

// ============================================================================
// Precedence
// ============================================================================

#[test]
fn test_and_inside_or_needs_no_parentheses() {
    let expr = reference("A").or(reference("B").and(reference("C")));
    assert_eq!(format_v4(&expr), "A or B and C");
}

#[test]
fn test_or_inside_and_is_parenthesized() {
    let expr = reference("A").or(reference("B")).and(reference("C"));
    assert_eq!(format_v4(&expr), "(A or B) and C");
}

#[test]
fn test_all_two_level_nestings_follow_rank_table() {
    for parent in BinOp::ALL {
        for child in BinOp::ALL {
            let inner = binary(child, reference("A"), reference("B"));
            let expr = binary(parent, inner.clone(), reference("C"));

            let inner_text = format!("A {} B", child.keyword());
            let expected = if child.rank() > parent.rank() {
                format!("({}) {} C", inner_text, parent.keyword())
            } else {
                format!("{} {} C", inner_text, parent.keyword())
            };
            assert_eq!(format_v4(&expr), expected, "{:?} inside {:?}", child, parent);

            let mirrored = binary(parent, reference("C"), inner);
            let expected = if child.rank() > parent.rank() {
                format!("C {} ({})", parent.keyword(), inner_text)
            } else {
                format!("C {} {}", parent.keyword(), inner_text)
            };
            assert_eq!(format_v4(&mirrored), expected, "{:?} right of {:?}", child, parent);
        }
    }
}

#[test]
fn test_arithmetic_operators_build_nodes() {
    let expr = (reference("Price") * 2 + 1).greater_than(10);
    assert_eq!(format_v4(&expr), "Price mul 2 add 1 gt 10");

    let expr = (reference("Price") + 1) * 2;
    assert_eq!(format_v4(&expr), "(Price add 1) mul 2");
}

#[test]
fn test_not_groups_compound_operands() {
    assert_eq!(format_v4(&!reference("A").equal(1)), "not(A eq 1)");
    assert_eq!(format_v4(&!reference("Discontinued")), "not Discontinued");
}

// ============================================================================
// Literals and special forms
// ============================================================================

#[test]
fn test_range_equality_expands_to_bounds() {
    let expr = reference("X").equal(Value::range(10, 20));
    assert_eq!(format_v4(&expr), "(X ge 10 and X le 20)");
    assert_eq!(format_v4(&reference("X").between(10, 20)), "(X ge 10 and X le 20)");
}

#[test]
fn test_v3_null_comparison_on_string_field() {
    let eq = reference("ProductName").equal(Value::Null);
    let ne = reference("ProductName").not_equal(Value::Null);

    assert_eq!(format_in(&eq, "Products", ProtocolVersion::V3).unwrap(), "not(ProductName ge '')");
    assert_eq!(format_in(&ne, "Products", ProtocolVersion::V3).unwrap(), "(ProductName ge '')");
    assert_eq!(format_in(&eq, "Products", ProtocolVersion::V4).unwrap(), "ProductName eq null");
}

#[test]
fn test_null_comparison_on_non_string_field_is_plain() {
    let expr = reference("UnitPrice").equal(Value::Null);
    assert_eq!(format_in(&expr, "Products", ProtocolVersion::V3).unwrap(), "UnitPrice eq null");
}

#[test]
fn test_long_literal_suffix_differs_by_version() {
    let expr = reference("Id").equal(Value::Int64(5));
    assert_eq!(format_v3(&expr), "Id eq 5L");
    assert_eq!(format_v4(&expr), "Id eq 5");
}

#[test]
fn test_string_literal_quotes_are_doubled() {
    let expr = reference("Name").equal("O'Neil");
    assert_eq!(format_v4(&expr), "Name eq 'O''Neil'");
}

// ============================================================================
// Reference resolution
// ============================================================================

#[test]
fn test_reference_names_are_corrected_by_schema() {
    let expr = reference("productname").equal("Chai");
    assert_eq!(format_in(&expr, "Products", ProtocolVersion::V4).unwrap(), "ProductName eq 'Chai'");
}

#[test]
fn test_navigation_path_switches_collection() {
    let expr = reference("category.categoryName").equal("Beverages");
    assert_eq!(
        format_in(&expr, "Products", ProtocolVersion::V4).unwrap(),
        "Category/CategoryName eq 'Beverages'"
    );
}

#[test]
fn test_date_part_segment_wraps_path() {
    let expr = reference("OrderDate.Year").equal(1997);
    assert_eq!(format_in(&expr, "Orders", ProtocolVersion::V3).unwrap(), "year(OrderDate) eq 1997");
}

#[test]
fn test_complex_member_passes_through() {
    let expr = reference("ShipAddress.City").equal("Lyon");
    assert_eq!(
        format_in(&expr, "Orders", ProtocolVersion::V4).unwrap(),
        "ShipAddress/City eq 'Lyon'"
    );
}

#[test]
fn test_unknown_segment_is_reference_error() {
    let expr = reference("Category.Nope").equal(1);
    let err = format_in(&expr, "Products", ProtocolVersion::V4).unwrap_err();

    assert_eq!(
        err,
        FormatError::ReferenceResolution {
            segment: "Nope".to_string(),
            path: "Category.Nope".to_string()
        }
    );
}

// ============================================================================
// Purity
// ============================================================================

#[test]
fn test_formatting_is_idempotent() {
    let expr = reference("ProductName")
        .contains("ai")
        .and(reference("UnitPrice").greater_than(20).or(!reference("Category.CategoryName").equal("Beverages")));

    let first = format_in(&expr, "Products", ProtocolVersion::V3).unwrap();
    let second = format_in(&expr, "Products", ProtocolVersion::V3).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        first,
        "substringof('ai',ProductName) and (UnitPrice gt 20 or not(Category/CategoryName eq 'Beverages'))"
    );
}
