use crate::db::Message;
use crate::include_res;

/// Render one message for one viewer class. The sender variant is
/// right-aligned with the sky accent and carries the editable marker; the
/// other variant is left-aligned with the purple accent. Pure function of
/// its inputs; the dispatcher decides which viewers see which variant.
pub fn message_fragment(message: &Message, author_handle: &str, viewer_is_sender: bool) -> String {
    let (row_classes, bubble_classes) = if viewer_is_sender {
        ("row mine-row", "bubble mine")
    } else {
        ("row", "bubble theirs")
    };

    // The sender variant carries the raw source so edit-in-place can seed
    // its editor without round-tripping through the rendered markdown.
    let mine_attr = if viewer_is_sender {
        format!(
            " data-mine=\"true\" data-content=\"{}\"",
            escape_attr(&message.content)
        )
    } else {
        String::new()
    };

    let mut content_html = String::new();
    pulldown_cmark::html::push_html(
        &mut content_html,
        pulldown_cmark::Parser::new(&message.content),
    );

    include_res!(str, "/pages/rooms/message.html")
        .replace("{id}", &message.id)
        .replace("{author_id}", &message.user_id)
        .replace("{handle}", author_handle)
        .replace("{row_classes}", row_classes)
        .replace("{bubble_classes}", bubble_classes)
        .replace("{mine_attr}", &mine_attr)
        .replace("{content}", content_html.trim_end())
}

fn escape_attr(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(content: &str) -> Message {
        Message {
            id: "m1".to_owned(),
            room_id: "r1".to_owned(),
            user_id: "u1".to_owned(),
            content: content.to_owned(),
            created_at: "2026-01-01T00:00:00Z".to_owned(),
            updated_at: "2026-01-01T00:00:00Z".to_owned(),
        }
    }

    #[test]
    fn sender_and_other_variants_differ() {
        let m = message("hi");
        let mine = message_fragment(&m, "alice", true);
        let theirs = message_fragment(&m, "alice", false);
        assert_ne!(mine, theirs);
        assert!(mine.contains("hi"));
        assert!(theirs.contains("hi"));
    }

    #[test]
    fn only_the_sender_variant_is_editable() {
        let m = message("hi");
        assert!(message_fragment(&m, "alice", true).contains("data-mine=\"true\""));
        assert!(!message_fragment(&m, "alice", false).contains("data-mine"));
    }

    #[test]
    fn fragment_is_addressable_by_message_id() {
        let m = message("hi");
        let html = message_fragment(&m, "alice", false);
        assert!(html.contains("id=\"message-m1\""));
        assert!(html.contains("alice"));
    }

    #[test]
    fn sender_variant_carries_raw_source_for_editing() {
        let m = message("*hi*");
        let mine = message_fragment(&m, "alice", true);
        assert!(mine.contains("data-content=\"*hi*\""));
        assert!(!message_fragment(&m, "alice", false).contains("data-content"));
    }

    #[test]
    fn raw_source_is_attribute_escaped() {
        let m = message("say \"hi\" & <b>");
        let mine = message_fragment(&m, "alice", true);
        assert!(mine.contains("data-content=\"say &quot;hi&quot; &amp; &lt;b&gt;\""));
    }

    #[test]
    fn content_is_rendered_as_markdown() {
        let m = message("*hi*");
        let html = message_fragment(&m, "alice", false);
        assert!(html.contains("<em>hi</em>"));
    }
}
