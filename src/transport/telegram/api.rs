use crate::transport::traits::{InboundEvent, UserRef};
use serde_json::Value;

fn parse_user(value: &Value) -> Option<UserRef> {
    let from = value.get("from")?;
    let id = from.get("id").and_then(Value::as_i64)?;
    let first_name = from
        .get("first_name")
        .and_then(Value::as_str)
        .unwrap_or("there")
        .to_string();
    Some(UserRef { id, first_name })
}

fn parse_message(message: &Value) -> Option<InboundEvent> {
    let from = parse_user(message)?;

    if let Some(payment) = message.get("successful_payment") {
        let payload = payment
            .get("invoice_payload")
            .and_then(Value::as_str)?
            .to_string();
        return Some(InboundEvent::PaymentSuccess { from, payload });
    }

    if let Some(contact) = message.get("contact") {
        let phone = contact
            .get("phone_number")
            .and_then(Value::as_str)?
            .to_string();
        // A forwarded third-party contact has no user_id; 0 never matches a
        // real sender, so the gate rejects it as spoofed.
        let contact_user_id = contact.get("user_id").and_then(Value::as_i64).unwrap_or(0);
        return Some(InboundEvent::Contact {
            from,
            contact_user_id,
            phone,
        });
    }

    if let Some(document) = message.get("document") {
        let file_id = document.get("file_id").and_then(Value::as_str)?.to_string();
        let file_name = document
            .get("file_name")
            .and_then(Value::as_str)
            .unwrap_or("file")
            .to_string();
        return Some(InboundEvent::Document {
            from,
            file_id,
            file_name,
        });
    }

    if let Some(photos) = message.get("photo").and_then(Value::as_array) {
        // Sizes are ordered smallest first; keep the largest rendition.
        let file_id = photos
            .last()
            .and_then(|photo| photo.get("file_id"))
            .and_then(Value::as_str)?
            .to_string();
        let caption = message
            .get("caption")
            .and_then(Value::as_str)
            .map(ToString::to_string);
        return Some(InboundEvent::Photo {
            from,
            file_id,
            caption,
        });
    }

    let text = message.get("text").and_then(Value::as_str)?.to_string();
    Some(InboundEvent::Text { from, text })
}

fn parse_callback(callback: &Value) -> Option<InboundEvent> {
    let from = parse_user(callback)?;
    let callback_id = callback.get("id").and_then(Value::as_str)?.to_string();
    let data = callback.get("data").and_then(Value::as_str)?.to_string();
    let message_id = callback
        .get("message")
        .and_then(|message| message.get("message_id"))
        .and_then(Value::as_i64)
        .unwrap_or(0);
    Some(InboundEvent::Callback {
        from,
        callback_id,
        message_id,
        data,
    })
}

fn parse_precheckout(query: &Value) -> Option<InboundEvent> {
    let from = parse_user(query)?;
    let query_id = query.get("id").and_then(Value::as_str)?.to_string();
    let payload = query
        .get("invoice_payload")
        .and_then(Value::as_str)?
        .to_string();
    Some(InboundEvent::PreCheckout {
        from,
        query_id,
        payload,
    })
}

/// Map one Bot API update onto an inbound event. Unknown or incomplete
/// updates are skipped, not errors.
pub fn parse_update(update: &Value) -> Option<InboundEvent> {
    if let Some(message) = update.get("message") {
        return parse_message(message);
    }
    if let Some(callback) = update.get("callback_query") {
        return parse_callback(callback);
    }
    if let Some(query) = update.get("pre_checkout_query") {
        return parse_precheckout(query);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::parse_update;
    use crate::transport::traits::InboundEvent;
    use serde_json::json;

    #[test]
    fn text_message_parses() {
        let update = json!({
            "update_id": 1,
            "message": {
                "from": {"id": 42, "first_name": "Ada"},
                "chat": {"id": 42},
                "text": "hello"
            }
        });

        match parse_update(&update) {
            Some(InboundEvent::Text { from, text }) => {
                assert_eq!(from.id, 42);
                assert_eq!(from.first_name, "Ada");
                assert_eq!(text, "hello");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn photo_keeps_largest_rendition_and_caption() {
        let update = json!({
            "message": {
                "from": {"id": 42, "first_name": "Ada"},
                "photo": [
                    {"file_id": "small"},
                    {"file_id": "large"}
                ],
                "caption": "what is this"
            }
        });

        match parse_update(&update) {
            Some(InboundEvent::Photo {
                file_id, caption, ..
            }) => {
                assert_eq!(file_id, "large");
                assert_eq!(caption.as_deref(), Some("what is this"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn document_falls_back_to_generic_name() {
        let update = json!({
            "message": {
                "from": {"id": 42, "first_name": "Ada"},
                "document": {"file_id": "doc-1"}
            }
        });

        match parse_update(&update) {
            Some(InboundEvent::Document { file_name, .. }) => assert_eq!(file_name, "file"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn contact_without_user_id_gets_zero() {
        let update = json!({
            "message": {
                "from": {"id": 42, "first_name": "Ada"},
                "contact": {"phone_number": "+99890000000"}
            }
        });

        match parse_update(&update) {
            Some(InboundEvent::Contact {
                contact_user_id,
                phone,
                ..
            }) => {
                assert_eq!(contact_user_id, 0);
                assert_eq!(phone, "+99890000000");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn successful_payment_wins_over_text() {
        let update = json!({
            "message": {
                "from": {"id": 42, "first_name": "Ada"},
                "successful_payment": {"invoice_payload": "42_Pro"}
            }
        });

        match parse_update(&update) {
            Some(InboundEvent::PaymentSuccess { payload, .. }) => assert_eq!(payload, "42_Pro"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn callback_query_parses_with_message_id() {
        let update = json!({
            "callback_query": {
                "id": "cb-1",
                "from": {"id": 42, "first_name": "Ada"},
                "message": {"message_id": 77},
                "data": "buy_Pro"
            }
        });

        match parse_update(&update) {
            Some(InboundEvent::Callback {
                callback_id,
                message_id,
                data,
                ..
            }) => {
                assert_eq!(callback_id, "cb-1");
                assert_eq!(message_id, 77);
                assert_eq!(data, "buy_Pro");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn precheckout_query_parses() {
        let update = json!({
            "pre_checkout_query": {
                "id": "pcq-1",
                "from": {"id": 42, "first_name": "Ada"},
                "invoice_payload": "42_Premium"
            }
        });

        match parse_update(&update) {
            Some(InboundEvent::PreCheckout {
                query_id, payload, ..
            }) => {
                assert_eq!(query_id, "pcq-1");
                assert_eq!(payload, "42_Premium");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_update_kind_is_skipped() {
        let update = json!({"update_id": 9, "edited_message": {"text": "x"}});
        assert!(parse_update(&update).is_none());
    }

    #[test]
    fn message_without_payload_fields_is_skipped() {
        let update = json!({
            "message": {"from": {"id": 42, "first_name": "Ada"}, "sticker": {}}
        });
        assert!(parse_update(&update).is_none());
    }
}
