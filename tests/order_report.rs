use pretty_assertions::assert_eq;
use tagmerge::{check_and_render, render, tokenize, validate, CheckError, Config, DataNode};

const CUSTOMER: &str = r#"{
    "FirstName": "Grace",
    "LastName": "Hopper",
    "Vip": true,
    "Contact": { "Email": "grace@example.com", "PhoneNumber": null },
    "Orders": [
        { "OrderID": 1001, "ItemName": "Compiler", "Qty": 1, "Lines": ["parse", "emit"] },
        { "OrderID": 1002, "ItemName": "Moth", "Qty": 12, "Lines": [] }
    ]
}"#;

const TEMPLATE: &str = "\
Dear <<if [Vip]>>valued customer <</if>><<[FirstName]>> <<[LastName]>>,

<<var [phone = Contact.PhoneNumber]>>\
We will write to <<[Contact.Email]>><<if [phone != null]>> or call <<[phone]>><</if>>.

<<foreach [order in Orders]>>\
Order #<<[order.OrderID]>>: <<[order.ItemName]>> \
<<if [order.Qty > 10]>>(bulk)<<elseif [order.Qty > 1]>>(several)<<else>>(single)<</if>>
<<foreach [line in order.Lines]>>  * <<[line]>>
<</foreach>>\
<</foreach>>\
Regards";

fn customer() -> DataNode {
    DataNode::from_json_str(CUSTOMER).unwrap()
}

#[test]
fn full_order_letter() {
    let tokens = tokenize(TEMPLATE);
    let data = customer();
    validate(&tokens, &data).unwrap();

    let expected = "\
Dear valued customer Grace Hopper,

We will write to grace@example.com.

Order #1001: Compiler (single)
  * parse
  * emit
Order #1002: Moth (bulk)
Regards";
    assert_eq!(render(&tokens, &data).unwrap(), expected);
}

#[test]
fn same_letter_through_check_and_render() {
    let out = check_and_render(TEMPLATE, &customer(), &Config::new()).unwrap();
    assert!(out.starts_with("Dear valued customer Grace Hopper,"));
    assert!(out.ends_with("Regards"));
}

#[test]
fn removed_field_is_caught_before_rendering() {
    let mut json: serde_json::Value = serde_json::from_str(CUSTOMER).unwrap();
    json["Contact"].as_object_mut().unwrap().remove("Email");
    let data = DataNode::from(json);

    let err = check_and_render(TEMPLATE, &data, &Config::new()).unwrap_err();
    let CheckError::Invalid(report) = err else {
        panic!("expected validation to fail");
    };
    let missing: Vec<String> = report.missing_fields.iter().map(ToString::to_string).collect();
    assert_eq!(missing, vec!["Contact.Email"]);
    assert!(report.structural_errors.is_empty());
}

#[test]
fn available_fields_for_the_customer() {
    let paths: Vec<String> = customer().field_paths().iter().map(ToString::to_string).collect();
    assert_eq!(
        paths,
        vec![
            "Contact.Email",
            "Contact.PhoneNumber",
            "FirstName",
            "LastName",
            "Orders.0.ItemName",
            "Orders.0.Lines.0",
            "Orders.0.Lines.1",
            "Orders.0.OrderID",
            "Orders.0.Qty",
            "Orders.1.ItemName",
            "Orders.1.Lines",
            "Orders.1.OrderID",
            "Orders.1.Qty",
            "Vip",
        ]
    );
}
