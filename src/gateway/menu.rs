use crate::export::{DocumentRenderer, ExportFormat, offered_formats};
use crate::tiers::Tier;
use crate::transport::Keyboard;

/// Reply-keyboard language picker rows, label → locale code.
pub const LANGUAGE_OPTIONS: [(&str, &str); 3] = [
    ("English 🇺🇸", "en"),
    ("Russian 🇷🇺", "ru"),
    ("Uzbek 🇺🇿", "uz"),
];

/// The persistent main menu, laid out two buttons per row.
#[must_use]
pub fn main_keyboard(lang: &str) -> Keyboard {
    Keyboard::Reply(vec![
        vec![
            t!("menu.chat", locale = lang).into_owned(),
            t!("menu.file", locale = lang).into_owned(),
        ],
        vec![
            t!("menu.analyze", locale = lang).into_owned(),
            t!("menu.imggen", locale = lang).into_owned(),
        ],
        vec![
            t!("menu.uploads", locale = lang).into_owned(),
            t!("menu.usage", locale = lang).into_owned(),
        ],
        vec![
            t!("menu.tier", locale = lang).into_owned(),
            t!("menu.lang", locale = lang).into_owned(),
        ],
        vec![t!("menu.clear", locale = lang).into_owned()],
    ])
}

#[must_use]
pub fn language_keyboard() -> Keyboard {
    Keyboard::Reply(vec![
        LANGUAGE_OPTIONS
            .iter()
            .map(|(label, _)| (*label).to_string())
            .collect(),
    ])
}

fn format_label(format: ExportFormat) -> &'static str {
    match format {
        ExportFormat::Docx => "📝 Word",
        ExportFormat::Pdf => "📕 PDF",
        ExportFormat::Py => "🐍 Python",
        ExportFormat::Txt => "📄 Text",
    }
}

/// Inline picker over the formats the renderer can actually produce,
/// two per row.
#[must_use]
pub fn format_keyboard(renderer: &dyn DocumentRenderer) -> Keyboard {
    let buttons: Vec<(String, String)> = offered_formats(renderer)
        .into_iter()
        .map(|format| {
            (
                format_label(format).to_string(),
                format!("fmt_{format}"),
            )
        })
        .collect();

    Keyboard::Inline(buttons.chunks(2).map(<[_]>::to_vec).collect())
}

/// Inline plan picker for the SelectPlan stage.
#[must_use]
pub fn upgrade_keyboard(options: &[(Tier, u32)]) -> Keyboard {
    Keyboard::Inline(
        options
            .iter()
            .map(|(tier, price)| {
                vec![(
                    format!("{tier} ({}k UZS)", price / 1000),
                    format!("buy_{tier}"),
                )]
            })
            .collect(),
    )
}

/// Inline provider picker for the SelectProvider stage.
#[must_use]
pub fn provider_keyboard(plan: Tier) -> Keyboard {
    Keyboard::Inline(vec![
        vec![
            ("💳 Click".to_string(), format!("pay_click_{plan}")),
            ("💳 Payme".to_string(), format!("pay_payme_{plan}")),
        ],
        vec![("💳 Stripe".to_string(), format!("pay_stripe_{plan}"))],
    ])
}

/// Allow/Deny/Block affordances attached to an approval request.
#[must_use]
pub fn decision_keyboard(user_id: i64) -> Keyboard {
    Keyboard::Inline(vec![
        vec![
            (
                t!("admin.allow_button").into_owned(),
                format!("allow_{user_id}"),
            ),
            (
                t!("admin.deny_button").into_owned(),
                format!("deny_{user_id}"),
            ),
        ],
        vec![(
            t!("admin.block_button").into_owned(),
            format!("block_{user_id}"),
        )],
    ])
}

#[cfg(test)]
mod tests {
    use super::{
        decision_keyboard, format_keyboard, language_keyboard, main_keyboard, provider_keyboard,
        upgrade_keyboard,
    };
    use crate::export::PlainTextRenderer;
    use crate::tiers::Tier;
    use crate::transport::Keyboard;

    #[test]
    fn main_keyboard_has_all_nine_buttons() {
        let Keyboard::Reply(rows) = main_keyboard("en") else {
            panic!("expected a reply keyboard");
        };
        let count: usize = rows.iter().map(Vec::len).sum();
        assert_eq!(count, 9);
    }

    #[test]
    fn main_keyboard_localizes_labels() {
        let Keyboard::Reply(rows) = main_keyboard("ru") else {
            panic!("expected a reply keyboard");
        };
        assert_eq!(rows[0][0], "💬 Чат");
    }

    #[test]
    fn language_keyboard_lists_three_options() {
        let Keyboard::Reply(rows) = language_keyboard() else {
            panic!("expected a reply keyboard");
        };
        assert_eq!(rows[0].len(), 3);
    }

    #[test]
    fn format_keyboard_offers_only_supported_formats() {
        let Keyboard::Inline(rows) = format_keyboard(&PlainTextRenderer) else {
            panic!("expected an inline keyboard");
        };
        let data: Vec<&str> = rows
            .iter()
            .flatten()
            .map(|(_, data)| data.as_str())
            .collect();
        assert_eq!(data, vec!["fmt_py", "fmt_txt"]);
    }

    #[test]
    fn upgrade_keyboard_encodes_plan_in_callback() {
        let Keyboard::Inline(rows) = upgrade_keyboard(&Tier::Basic.upgrades()) else {
            panic!("expected an inline keyboard");
        };
        assert_eq!(rows[0][0].0, "Pro (129k UZS)");
        assert_eq!(rows[0][0].1, "buy_Pro");
        assert_eq!(rows[1][0].1, "buy_Premium");
    }

    #[test]
    fn provider_keyboard_encodes_provider_and_plan() {
        let Keyboard::Inline(rows) = provider_keyboard(Tier::Pro) else {
            panic!("expected an inline keyboard");
        };
        assert_eq!(rows[0][0].1, "pay_click_Pro");
        assert_eq!(rows[0][1].1, "pay_payme_Pro");
        assert_eq!(rows[1][0].1, "pay_stripe_Pro");
    }

    #[test]
    fn decision_keyboard_targets_the_requester() {
        let Keyboard::Inline(rows) = decision_keyboard(42) else {
            panic!("expected an inline keyboard");
        };
        assert_eq!(rows[0][0].1, "allow_42");
        assert_eq!(rows[0][1].1, "deny_42");
        assert_eq!(rows[1][0].1, "block_42");
    }
}
