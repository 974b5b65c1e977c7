//! Golden tests for the end-to-end reply pipeline.

use chrono::{DateTime, TimeZone, Utc};
use pianta_shared::history::{compact_history, compact_turns};
use pianta_shared::{
    build_prompt, produce_reply, ChatContext, DecisionAudit, LightAction, PlantProfile, Prediction,
    StoredTurn, TelemetryReading, Urgency, WaterAction,
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 27, 10, 0, 0).unwrap()
}

fn pepe(message: &str) -> ChatContext {
    ChatContext {
        user_message: message.to_string(),
        plant: PlantProfile {
            name: "Pepe".into(),
            plant_type: "peperoncino".into(),
            created_at: Some(Utc.with_ymd_and_hms(2026, 2, 15, 10, 0, 0).unwrap()),
            ..Default::default()
        },
        latest_reading: Some(TelemetryReading::new(56.0, 600.0)),
        ..Default::default()
    }
}

const GOOD_OUTPUT: &str = r#"Certo! {
  "decision": {"water": "water_now", "light": "ok", "urgency": "low", "confidence": 0.82},
  "motivation": {"summary": "Terreno ancora umido, luce scarsa.", "sensor_consistency": "I dati sono coerenti."},
  "actions": [
    {"title": "Avvicinami alla finestra", "when": "oggi"},
    {"title": "Controlla il sottovaso"},
    {"title": "Pulisci le foglie"},
    {"title": "Quarta azione ignorata"}
  ],
  "questions": ["Il vaso ha fori di drenaggio?", "Da quanto non mi rinvasi?", "Terza domanda"],
  "needs_photo": false
} Spero sia utile."#;

#[test]
fn golden_unparsable_output_uses_defaults() {
    let ctx = ChatContext {
        user_message: "Raccontami qualcosa".into(),
        ..Default::default()
    };
    let out = produce_reply(&ctx, "not json at all", now());
    assert_eq!(out.decision.water, WaterAction::CheckSoon);
    assert_eq!(out.decision.light, LightAction::Ok);
    assert_eq!(out.decision.urgency, Urgency::Medium);
    assert_eq!(out.decision.recheck_hours, 12.0);
    assert!(out.needs_follow_up);
    assert!(out.needs_photo, "default confidence 0.45 is below 0.5");
    assert!(out.reply.contains("Riepilogo: Non ho letture recenti dai sensori."));
}

#[test]
fn golden_full_reply_structure() {
    let out = produce_reply(&pepe("Come stai?"), GOOD_OUTPUT, now());
    assert!(out.model_parsed);
    // wet soil and dim light override the model
    assert_eq!(out.decision.water, WaterAction::Wait);
    assert_eq!(out.decision.light, LightAction::Increase);
    assert_eq!(out.decision.urgency, Urgency::Medium);
    assert!(out.decision.recheck_hours >= 18.0);
    assert_eq!(out.confidence, 0.82);
    assert!(!out.needs_photo);
    assert!(!out.needs_follow_up);
    assert!(out.follow_up_due_at.is_none());

    let lines: Vec<&str> = out.reply.lines().collect();
    assert!(lines[0].starts_with("Risposta: Sto abbastanza bene."));
    assert_eq!(lines[1], "Decisione: water=wait, light=increase, urgency=medium");
    assert_eq!(lines[2], "Riepilogo: Terreno ancora umido, luce scarsa.");
    assert_eq!(lines[3], "Coerenza sensori: I dati sono coerenti.");
    assert!(out.reply.contains("1. Acqua: non annaffiare adesso"));
    assert!(out.reply.contains("3. Avvicinami alla finestra (oggi)"));
    assert!(out.reply.contains("5. Pulisci le foglie"));
    assert!(!out.reply.contains("Quarta azione"));
    assert!(out.reply.contains("- Da quanto non mi rinvasi?"));
    assert!(!out.reply.contains("Terza domanda"));
    assert!(!out.reply.contains("Foto:"));
}

#[test]
fn golden_aliveness_leads_the_reply() {
    let out = produce_reply(&pepe("Sei ancora viva?"), "not json at all", now());
    assert!(out.reply.starts_with("Risposta: Si, sono viva."));
}

#[test]
fn golden_reply_compacts_to_labelled_lines() {
    let out = produce_reply(&pepe("Sei ancora viva?"), GOOD_OUTPUT, now());
    let stored = vec![
        StoredTurn::new("assistant", out.reply.clone()),
        StoredTurn::new("user", "Sei ancora viva?"),
    ];
    let compacted = compact_history(&stored);
    assert_eq!(compacted.len(), 2);
    let assistant = &compacted[1].content;
    assert!(assistant.starts_with("Risposta: Si, sono viva."));
    assert!(assistant.ends_with("Riepilogo: Terreno ancora umido, luce scarsa."));
    assert_eq!(assistant.lines().count(), 2);
    assert_eq!(compact_turns(&compacted), compacted);
}

#[test]
fn golden_conflicting_prediction_is_reported() {
    let mut ctx = pepe("Come va?");
    ctx.latest_reading = Some(TelemetryReading::new(10.0, 5000.0));
    ctx.prediction = Some(Prediction {
        watering_action: "Do not water".into(),
        light_action: "ok".into(),
        confidence: Some(0.9),
        summary: String::new(),
    });
    let out = produce_reply(&ctx, "{}", now());
    assert_eq!(out.decision.water, WaterAction::WaterNow);
    assert!(out.reply.contains("Coerenza sensori:"));
}

#[test]
fn golden_prompt_and_audit() {
    let mut ctx = pepe("Come stai?");
    ctx.stored_conversation = vec![StoredTurn::new("user", "ciao")];
    let prompt = build_prompt(&ctx);
    assert!(prompt.system.starts_with("Sei la pianta 'Pepe'."));
    assert_eq!(prompt.messages.len(), 1);

    let out = produce_reply(&ctx, GOOD_OUTPUT, now());
    let audit = DecisionAudit::record(&ctx, GOOD_OUTPUT, &out, now())
        .to_json()
        .unwrap();
    assert_eq!(audit["reading"]["moisture"], 56.0);
    assert_eq!(audit["decision"]["light"], "increase");
    assert_eq!(audit["reply"], serde_json::Value::String(out.reply.clone()));
}
