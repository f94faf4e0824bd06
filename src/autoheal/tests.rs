use super::*;

#[test]
fn default_rules_map_keywords_to_actions() {
    let table = RuleTable::default();
    let cases = [
        ("API latency above SLO", HealAction::ScaleUp),
        ("Checkout is SLOW", HealAction::ScaleUp),
        ("Payment service down", HealAction::RestartService),
        ("Worker crashed overnight", HealAction::RestartService),
        ("Disk usage at 98%", HealAction::ClearCache),
        ("Volume full on db host", HealAction::ClearCache),
        ("User cannot login", HealAction::ResetPassword),
        ("Password expired", HealAction::ResetPassword),
        ("Printer jammed", HealAction::EngineerInvestigation),
    ];

    for (description, expected) in cases {
        assert_eq!(table.determine_action(description), expected, "{}", description);
    }
}

#[test]
fn first_matching_rule_wins() {
    let table = RuleTable::default();
    assert_eq!(
        table.determine_action("Site down because disk is full and slow"),
        HealAction::ScaleUp
    );
    assert_eq!(
        table.determine_action("login service down"),
        HealAction::RestartService
    );
}

#[test]
fn plan_substitutes_the_target() {
    let table = RuleTable::default();

    let plan = table.plan("payments API crash", Some("payments-api"));
    assert_eq!(plan.action, HealAction::RestartService);
    assert_eq!(plan.command, "systemctl restart payments-api");

    let plan = table.plan("slow responses", None);
    assert_eq!(
        plan.command,
        "kubectl scale deployment service_x --replicas=5"
    );

    let plan = table.plan("slow responses", Some("   "));
    assert!(plan.command.contains(DEFAULT_TARGET));
}

#[test]
fn templates_without_placeholder_are_echoed() {
    let table = RuleTable::default();
    let plan = table.plan("disk full", Some("ignored"));
    assert_eq!(plan.command, "rm -rf /tmp/cache/*");

    let plan = table.plan("unknown problem", Some("ignored"));
    assert_eq!(plan.action, HealAction::EngineerInvestigation);
    assert_eq!(plan.command, "Manual investigation ticket created.");
}

#[test]
fn custom_tables_use_their_own_rules() {
    let table = RuleTable::new(HealAction::EngineerInvestigation)
        .with_rule(&["OOM"], HealAction::RestartService);

    assert_eq!(
        table.determine_action("pod killed: oom"),
        HealAction::RestartService
    );
    assert_eq!(
        table.determine_action("service down"),
        HealAction::EngineerInvestigation
    );
}

#[test]
fn actions_serialize_in_snake_case() {
    let plan = RuleTable::default().plan("vpn down", Some("vpn"));
    let json = serde_json::to_value(&plan).expect("serializes");
    assert_eq!(json["action"], "restart_service");
    assert_eq!(json["command"], "systemctl restart vpn");
}
