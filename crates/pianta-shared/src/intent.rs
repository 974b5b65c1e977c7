//! Keyword-driven conversational responder.
//!
//! The user message is lower-cased, accent-folded and stripped of punctuation,
//! then checked against `PRIORITY` top to bottom; the first intent whose cues
//! match wins. No scoring, no fallthrough.

use crate::guardrail::species_hint;
use crate::model_output::{LightAction, Urgency, WaterAction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Recognized user intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Age,
    Care,
    Species,
    Aliveness,
    YellowSymptom,
    Symptom,
    Greeting,
    WaterQuestion,
    LightQuestion,
    Status,
    Default,
}

/// Evaluation order. `Default` is implied when nothing matches.
pub const PRIORITY: &[Intent] = &[
    Intent::Age,
    Intent::Care,
    Intent::Species,
    Intent::Aliveness,
    Intent::YellowSymptom,
    Intent::Symptom,
    Intent::Greeting,
    Intent::WaterQuestion,
    Intent::LightQuestion,
    Intent::Status,
];

/// How a keyword matches the normalized message.
#[derive(Debug, Clone, Copy)]
pub enum Cue {
    /// Whole token
    Word(&'static str),
    /// Any token starting with this prefix
    Stem(&'static str),
    /// Contiguous whole tokens
    Phrase(&'static str),
}

const AGE_CUES: &[Cue] = &[
    Cue::Phrase("quanti giorni"),
    Cue::Phrase("quanti mesi"),
    Cue::Phrase("quanti anni"),
    Cue::Phrase("da quanto tempo sei"),
    Cue::Phrase("quanto sei vecchia"),
    Cue::Phrase("quanto sei vecchio"),
    Cue::Word("eta"),
    Cue::Phrase("how old"),
    Cue::Phrase("how many days"),
];

const CARE_CUES: &[Cue] = &[
    Cue::Phrase("tenerti in vita"),
    Cue::Phrase("tenerti bene"),
    Cue::Phrase("prendermi cura"),
    Cue::Phrase("prendere cura"),
    Cue::Phrase("come curarti"),
    Cue::Phrase("come ti curo"),
    Cue::Phrase("di cosa hai bisogno"),
    Cue::Phrase("cosa ti serve"),
    Cue::Phrase("take care"),
    Cue::Phrase("what do you need"),
];

const SPECIES_CUES: &[Cue] = &[
    Cue::Phrase("che tipo di pianta"),
    Cue::Phrase("tipo di pianta"),
    Cue::Phrase("che pianta sei"),
    Cue::Word("specie"),
    Cue::Phrase("what kind of plant"),
    Cue::Phrase("what plant"),
    Cue::Word("species"),
];

const ALIVE_CUES: &[Cue] = &[
    Cue::Phrase("sei viva"),
    Cue::Phrase("sei vivo"),
    Cue::Phrase("ancora viva"),
    Cue::Phrase("ancora vivo"),
    Cue::Phrase("sei morta"),
    Cue::Phrase("sei morto"),
    Cue::Phrase("stai morendo"),
    Cue::Phrase("are you alive"),
    Cue::Phrase("still alive"),
];

const YELLOW_CUES: &[Cue] = &[Cue::Stem("giall"), Cue::Stem("ingiall"), Cue::Word("yellow")];

const LEAF_CUES: &[Cue] = &[Cue::Stem("fogli"), Cue::Word("leaf"), Cue::Word("leaves")];

/// Symptom categories with the label used in the reply.
const SYMPTOM_CATEGORIES: &[(&str, &[Cue])] = &[
    ("macchie", &[Cue::Stem("macchi"), Cue::Word("spots")]),
    (
        "parassiti",
        &[
            Cue::Stem("parassit"),
            Cue::Stem("afid"),
            Cue::Stem("insett"),
            Cue::Stem("cocciniglia"),
            Cue::Stem("ragnett"),
            Cue::Word("pests"),
            Cue::Word("bugs"),
        ],
    ),
    (
        "foglie arricciate",
        &[Cue::Stem("arricci"), Cue::Stem("accartocc"), Cue::Stem("curl")],
    ),
    ("carenza nutritiva", &[Cue::Stem("carenz"), Cue::Stem("deficien")]),
    (
        "funghi o muffa",
        &[
            Cue::Stem("fung"),
            Cue::Stem("muff"),
            Cue::Word("mold"),
            Cue::Word("mould"),
            Cue::Word("oidio"),
        ],
    ),
    (
        "malattia",
        &[Cue::Stem("malatt"), Cue::Word("disease"), Cue::Stem("marcium")],
    ),
];

const GREETING_CUES: &[Cue] = &[
    Cue::Word("ciao"),
    Cue::Word("buongiorno"),
    Cue::Word("buonasera"),
    Cue::Phrase("buon pomeriggio"),
    Cue::Word("salve"),
    Cue::Word("ehi"),
    Cue::Word("hey"),
    Cue::Word("hello"),
    Cue::Word("hi"),
];

const WATER_CUES: &[Cue] = &[
    Cue::Stem("acqu"),
    Cue::Stem("annaff"),
    Cue::Stem("innaff"),
    Cue::Stem("irrig"),
    Cue::Stem("water"),
    Cue::Word("sete"),
];

const LIGHT_CUES: &[Cue] = &[
    Cue::Word("luce"),
    Cue::Stem("luminos"),
    Cue::Word("sole"),
    Cue::Word("ombra"),
    Cue::Word("buio"),
    Cue::Word("light"),
    Cue::Word("sun"),
    Cue::Word("lux"),
];

const STATUS_CUES: &[Cue] = &[
    Cue::Phrase("come stai"),
    Cue::Phrase("come va"),
    Cue::Phrase("come ti senti"),
    Cue::Phrase("tutto bene"),
    Cue::Phrase("how are you"),
    Cue::Word("stato"),
    Cue::Word("status"),
];

/// User message after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedMessage {
    tokens: Vec<String>,
    padded: String,
}

impl NormalizedMessage {
    pub fn new(raw: &str) -> Self {
        let folded: String = raw
            .to_lowercase()
            .chars()
            .map(fold_accent)
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect();
        let tokens: Vec<String> = folded.split_whitespace().map(str::to_string).collect();
        let padded = format!(" {} ", tokens.join(" "));
        Self { tokens, padded }
    }

    pub fn matches(&self, cue: &Cue) -> bool {
        match cue {
            Cue::Word(w) => self.tokens.iter().any(|t| t == w),
            Cue::Stem(s) => self.tokens.iter().any(|t| t.starts_with(s)),
            Cue::Phrase(p) => self.padded.contains(&format!(" {} ", p)),
        }
    }

    pub fn matches_any(&self, cues: &[Cue]) -> bool {
        cues.iter().any(|c| self.matches(c))
    }
}

fn fold_accent(c: char) -> char {
    match c {
        'à' | 'á' | 'â' => 'a',
        'è' | 'é' | 'ê' => 'e',
        'ì' | 'í' | 'î' => 'i',
        'ò' | 'ó' | 'ô' => 'o',
        'ù' | 'ú' | 'û' => 'u',
        other => other,
    }
}

impl Intent {
    pub fn matches(&self, msg: &NormalizedMessage) -> bool {
        match self {
            Intent::Age => msg.matches_any(AGE_CUES),
            Intent::Care => msg.matches_any(CARE_CUES),
            Intent::Species => msg.matches_any(SPECIES_CUES),
            Intent::Aliveness => msg.matches_any(ALIVE_CUES),
            Intent::YellowSymptom => msg.matches_any(YELLOW_CUES),
            Intent::Symptom => !symptom_labels(msg).is_empty(),
            Intent::Greeting => msg.matches_any(GREETING_CUES),
            Intent::WaterQuestion => msg.matches_any(WATER_CUES),
            Intent::LightQuestion => msg.matches_any(LIGHT_CUES),
            Intent::Status => msg.matches_any(STATUS_CUES),
            Intent::Default => true,
        }
    }
}

/// First matching intent in priority order.
pub fn classify(message: &str) -> Intent {
    classify_normalized(&NormalizedMessage::new(message))
}

fn classify_normalized(msg: &NormalizedMessage) -> Intent {
    PRIORITY
        .iter()
        .copied()
        .find(|intent| intent.matches(msg))
        .unwrap_or(Intent::Default)
}

fn symptom_labels(msg: &NormalizedMessage) -> Vec<&'static str> {
    SYMPTOM_CATEGORIES
        .iter()
        .filter(|(_, cues)| msg.matches_any(cues))
        .map(|(label, _)| *label)
        .collect()
}

/// Everything a response may draw on.
#[derive(Debug, Clone)]
pub struct IntentContext<'a> {
    pub message: &'a str,
    pub plant_name: &'a str,
    pub plant_type: &'a str,
    pub plant_created_at: Option<DateTime<Utc>>,
    pub has_images: bool,
    pub summary: &'a str,
    pub water: WaterAction,
    pub light: LightAction,
    pub urgency: Urgency,
    pub now: DateTime<Utc>,
}

/// Tailored conversational reply for the user's message.
pub fn respond(ctx: &IntentContext<'_>) -> String {
    let msg = NormalizedMessage::new(ctx.message);
    let intent = classify_normalized(&msg);

    let text = match intent {
        Intent::Age => age_reply(ctx),
        Intent::Care => care_reply(ctx),
        Intent::Species => species_reply(ctx),
        Intent::Aliveness => join(&[
            "Si, sono viva.",
            status_sentence(ctx.water, ctx.urgency),
            light_sentence(ctx.light),
        ]),
        Intent::YellowSymptom => yellow_reply(ctx, &msg),
        Intent::Symptom => symptom_reply(ctx, &msg),
        Intent::Greeting => join(&[
            &format!("Ciao! Sono {}.", ctx.plant_name),
            status_sentence(ctx.water, ctx.urgency),
            light_sentence(ctx.light),
        ]),
        Intent::WaterQuestion => join(&[water_answer(ctx.water, ctx.urgency), ctx.summary]),
        Intent::LightQuestion => join(&[light_answer(ctx.light), ctx.summary]),
        Intent::Status => join(&[
            mood(ctx.urgency),
            status_sentence(ctx.water, ctx.urgency),
            light_sentence(ctx.light),
            ctx.summary,
        ]),
        Intent::Default => default_reply(ctx),
    };
    text.trim().to_string()
}

/// Generic status + summary sentence; also the synthesizer's fallback line.
pub fn default_reply(ctx: &IntentContext<'_>) -> String {
    join(&[status_sentence(ctx.water, ctx.urgency), ctx.summary])
}

fn age_reply(ctx: &IntentContext<'_>) -> String {
    let lead = match ctx.plant_created_at {
        Some(created) => {
            let days = (ctx.now - created).num_days().max(0);
            if days == 1 {
                "Sono in vita da circa 1 giorno.".to_string()
            } else {
                format!("Sono in vita da circa {} giorni.", days)
            }
        }
        None => "Non ho una data di nascita registrata, quindi non so dirti da quanti giorni sono in vita."
            .to_string(),
    };
    join(&[&lead, status_sentence(ctx.water, ctx.urgency)])
}

fn care_reply(ctx: &IntentContext<'_>) -> String {
    let water = match ctx.water {
        WaterAction::WaterNow => "adesso ho bisogno di essere annaffiata, poi lascia asciugare i primi centimetri.",
        WaterAction::Wait => "per ora niente, annaffia quando i primi centimetri di terreno sono asciutti.",
        WaterAction::CheckSoon => "controlla il terreno entro poche ore e annaffia solo se e asciutto.",
    };
    let light = match ctx.light {
        LightAction::Increase => "mettimi in un punto piu luminoso, con luce indiretta intensa.",
        LightAction::Reduce => "riparami dal sole diretto nelle ore piu calde.",
        LightAction::Ok => "la posizione attuale va bene, evita sbalzi bruschi.",
    };
    format!(
        "Per tenermi bene:\n- Acqua: {}\n- Luce: {}\n- {}",
        water,
        light,
        species_hint(ctx.plant_type)
    )
}

fn species_reply(ctx: &IntentContext<'_>) -> String {
    let plant_type = ctx.plant_type.trim();
    if plant_type.is_empty() {
        return format!(
            "Non ho un tipo di pianta registrato: puoi indicarlo nelle impostazioni. Intanto mi chiamo {}.",
            ctx.plant_name
        );
    }
    join(&[
        &format!("Sono una pianta di tipo {}.", plant_type),
        species_hint(plant_type),
    ])
}

fn yellow_reply(ctx: &IntentContext<'_>, msg: &NormalizedMessage) -> String {
    let causes = if msg.matches_any(LEAF_CUES) {
        "Possibili cause delle foglie gialle: troppa acqua o ristagni, terreno rimasto secco a lungo, carenza di azoto o magnesio, poca luce, oppure foglie vecchie che la pianta lascia andare."
            .to_string()
    } else {
        let fruit = if msg.matches(&Cue::Stem("peperoncin")) {
            "dei peperoncini gialli"
        } else if msg.matches(&Cue::Stem("pomodor")) {
            "dei pomodori gialli"
        } else {
            "dei frutti gialli"
        };
        format!(
            "Possibili cause {}: maturazione naturale (per molte varieta il giallo e il colore finale), stress idrico, carenza di nutrienti o poca luce.",
            fruit
        )
    };
    join(&[
        &causes,
        &current_data(ctx.summary),
        photo_request(ctx.has_images),
    ])
}

fn symptom_reply(ctx: &IntentContext<'_>, msg: &NormalizedMessage) -> String {
    let labels = symptom_labels(msg).join(", ");
    join(&[
        &format!("Segnali che mi descrivi: {}.", labels),
        "Senza vederli non posso esserne certa: possono dipendere da parassiti, carenza nutritiva o funghi.",
        "Checklist osservabile: foglie (fronte/retro), fusto e nuovi germogli, substrato (odore, muffa, ristagni), presenza di insetti o ragnatele.",
        photo_request(ctx.has_images),
    ])
}

fn current_data(summary: &str) -> String {
    if summary.trim().is_empty() {
        String::new()
    } else {
        format!("Dati attuali: {}", summary.trim())
    }
}

fn photo_request(has_images: bool) -> &'static str {
    if has_images {
        "Grazie per le foto: se puoi, aggiungine una ravvicinata del retro delle foglie."
    } else {
        "Se puoi, invia foto ravvicinata della parte interessata, con luce naturale."
    }
}

fn status_sentence(water: WaterAction, urgency: Urgency) -> &'static str {
    match (water, urgency) {
        (WaterAction::WaterNow, Urgency::High) => "Ho proprio sete: annaffiami adesso.",
        (WaterAction::WaterNow, _) => "Mi farebbe bene un po' d'acqua adesso.",
        (WaterAction::Wait, _) => "Per l'acqua sto bene, possiamo aspettare.",
        (WaterAction::CheckSoon, _) => "Controlla presto il mio terriccio: potrei avere bisogno d'acqua.",
    }
}

fn light_sentence(light: LightAction) -> &'static str {
    match light {
        LightAction::Increase => "Vorrei un po' piu di luce.",
        LightAction::Reduce => "La luce e un po' troppo forte per me.",
        LightAction::Ok => "La luce va bene cosi.",
    }
}

fn water_answer(water: WaterAction, urgency: Urgency) -> &'static str {
    match (water, urgency) {
        (WaterAction::WaterNow, Urgency::High) => "Si, e urgente: annaffiami adesso.",
        (WaterAction::WaterNow, _) => "Si, ho bisogno di acqua adesso.",
        (WaterAction::Wait, _) => "No, per ora non annaffiarmi: il terreno e ancora umido.",
        (WaterAction::CheckSoon, _) => {
            "Non ancora: controlla il terreno tra poco e annaffia solo se e asciutto."
        }
    }
}

fn light_answer(light: LightAction) -> &'static str {
    match light {
        LightAction::Increase => "Mi serve piu luce: spostami vicino a una finestra luminosa.",
        LightAction::Reduce => "C'e troppa luce: riparami dal sole diretto.",
        LightAction::Ok => "La luce che ricevo va bene cosi.",
    }
}

fn mood(urgency: Urgency) -> &'static str {
    match urgency {
        Urgency::High => "Sono un po' in difficolta.",
        _ => "Sto abbastanza bene.",
    }
}

fn join(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
