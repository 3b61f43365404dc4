use rand::Rng;

use crate::domain::{FlipCard, Vocab};

pub(super) fn build<R: Rng + ?Sized>(vocabs: &[Vocab], rng: &mut R) -> Vec<FlipCard> {
    vocabs
        .iter()
        .map(|vocab| {
            let source = vec![vocab.text_source.clone()];
            let targets: Vec<String> = vocab.target_texts().map(str::to_string).collect();
            let (front, back) = if rng.random_bool(0.5) {
                (source, targets)
            } else {
                (targets, source)
            };
            FlipCard {
                vocab_id: vocab.id.clone(),
                front,
                back,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TextTarget;
    use chrono::Utc;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn every_card_holds_source_and_all_targets() {
        let vocab = Vocab {
            id: "v1".to_string(),
            user_id: "u1".to_string(),
            text_source: "hello".to_string(),
            source_language_code: "en".to_string(),
            target_language_code: "vi".to_string(),
            text_targets: vec![TextTarget::plain("xin chào"), TextTarget::plain("chào")],
            created_at: Utc::now(),
        };
        let mut rng = StdRng::seed_from_u64(3);
        let mut seen_source_front = false;
        let mut seen_source_back = false;
        for _ in 0..32 {
            let card = build(std::slice::from_ref(&vocab), &mut rng).remove(0);
            let (source_face, target_face) = if card.front == vec!["hello".to_string()] {
                seen_source_front = true;
                (&card.front, &card.back)
            } else {
                seen_source_back = true;
                (&card.back, &card.front)
            };
            assert_eq!(source_face, &vec!["hello".to_string()]);
            assert_eq!(target_face, &vec!["xin chào".to_string(), "chào".to_string()]);
        }
        assert!(seen_source_front && seen_source_back);
    }
}
