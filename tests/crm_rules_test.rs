#[cfg(test)]
mod crm_rules_tests {
    use chrono::{Duration, Utc};
    use crmserver::crm::{
        format_whatsapp, group_by_primary_stage, normalize_whatsapp, CanonicalStage,
        FunnelStageCustom, Lead,
    };
    use crmserver::demands::SlaConfig;
    use crmserver::finance::{match_pos_transaction, MatchStatus, PosTransaction, Sale, SaleStatus};
    use crmserver::webhooks::{payment_effect, PaymentEffect, PaymentWebhook};
    use uuid::Uuid;

    fn stage(org: Uuid, position: i32, value: CanonicalStage, name: &str) -> FunnelStageCustom {
        FunnelStageCustom {
            id: Uuid::new_v4(),
            organization_id: org,
            position,
            enum_value: value,
            name: name.to_string(),
            is_active: true,
        }
    }

    fn lead(org: Uuid, name: &str, stage: CanonicalStage) -> Lead {
        let mut lead = Lead::new(org, name.to_string());
        lead.stage = stage;
        lead
    }

    #[test]
    fn test_duplicate_alias_stages_show_leads_once() {
        let org = Uuid::new_v4();
        let inbox = stage(org, 1, CanonicalStage::New, "Entrada");
        let triage = stage(org, 2, CanonicalStage::New, "Triagem");
        let won = stage(org, 3, CanonicalStage::Won, "Fechado");
        let stages = vec![triage.clone(), inbox.clone(), won.clone()];

        let leads = vec![
            lead(org, "Ana", CanonicalStage::New),
            lead(org, "Bia", CanonicalStage::Won),
            lead(org, "Caio", CanonicalStage::Proposal),
        ];
        let board = group_by_primary_stage(&stages, leads);

        assert_eq!(board.columns.len(), 2);
        assert_eq!(board.columns[0].stage.id, inbox.id);
        assert_eq!(board.column(inbox.id).unwrap().items.len(), 1);
        assert!(board.column(triage.id).is_none());
        assert_eq!(board.column(won.id).unwrap().items[0].name, "Bia");
        assert_eq!(board.dropped, 1);
        assert_eq!(board.placed(), 2);
    }

    #[test]
    fn test_whatsapp_forms_share_one_canonical_value() {
        let forms = ["(11) 98765-4321", "11987654321", "+55 11 98765-4321", "551187654321"];
        for raw in forms {
            assert_eq!(normalize_whatsapp(raw).as_deref(), Some("5511987654321"), "{raw}");
        }
        assert!(normalize_whatsapp("12345").is_none());
        assert_eq!(
            format_whatsapp("5511987654321").as_deref(),
            Some("+55 (11) 98765-4321")
        );
    }

    #[test]
    fn test_payment_events_map_to_effects() {
        let now = Utc::now();
        let event: PaymentWebhook = serde_json::from_value(serde_json::json!({
            "id": "evt_1",
            "event": "PAYMENT_RECEIVED",
            "payment": { "id": "pay_1", "sale_id": Uuid::new_v4(), "value_cents": 10000 }
        }))
        .unwrap();

        assert_eq!(
            payment_effect(&event, now, Duration::days(30)),
            PaymentEffect::Confirm {
                net_cents: 10000,
                release_at: now + Duration::days(30)
            }
        );
    }

    #[test]
    fn test_pos_capture_with_two_candidates_is_ambiguous() {
        let org = Uuid::new_v4();
        let now = Utc::now();
        let sale = |offset: i64| Sale {
            id: Uuid::new_v4(),
            organization_id: org,
            lead_id: None,
            total_cents: 15_990,
            status: SaleStatus::Pending,
            payment_charge_id: None,
            tracking_code: None,
            shipping_status: None,
            paid_at: None,
            created_at: now + Duration::minutes(offset),
            updated_at: now,
        };
        let capture = PosTransaction {
            id: Uuid::new_v4(),
            organization_id: org,
            nsu: "000123".to_string(),
            amount_cents: 15_990,
            captured_at: now,
            match_status: MatchStatus::Unmatched,
            sale_id: None,
        };

        let one = vec![sale(5)];
        assert_eq!(
            match_pos_transaction(&capture, &one, Duration::minutes(30)).sale_id,
            Some(one[0].id)
        );

        let two = vec![sale(5), sale(-10)];
        let result = match_pos_transaction(&capture, &two, Duration::minutes(30));
        assert_eq!(result.status, MatchStatus::Ambiguous);
        assert!(result.sale_id.is_none());
    }

    #[test]
    fn test_sla_breach_is_sticky_after_completion() {
        let created = Utc::now() - Duration::hours(10);
        let sla = SlaConfig {
            response_hours: Some(1),
            resolution_hours: Some(4),
        };
        assert!(sla.is_breached(created, Some(created + Duration::hours(6)), Utc::now()));
        assert!(!sla.is_breached(created, Some(created + Duration::hours(2)), Utc::now()));
        assert!(!SlaConfig::default().is_breached(created, None, Utc::now()));
    }
}
