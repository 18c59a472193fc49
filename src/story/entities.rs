use std::collections::BTreeMap;

use super::types::TopEntity;
use crate::article::Article;

/// Rolls up entity mentions across a story's articles.
///
/// Entities are merged on exact `(text, type)` and counts summed. Blank texts
/// and zero counts are skipped. Ranked by count descending, then text, then type; at most `limit`
/// are kept.
pub fn aggregate_entities(articles: &[&Article], limit: usize) -> Vec<TopEntity> {
    let mut counts: BTreeMap<(&str, &str), u32> = BTreeMap::new();

    for article in articles {
        for entity in &article.entities {
            let text = entity.text.trim();
            if text.is_empty() || entity.count == 0 {
                continue;
            }
            let entry = counts.entry((text, entity.entity_type.trim())).or_insert(0);
            *entry = entry.saturating_add(entity.count);
        }
    }

    let mut ranked: Vec<TopEntity> = counts
        .into_iter()
        .map(|((text, entity_type), count)| TopEntity {
            text: text.to_string(),
            entity_type: entity_type.to_string(),
            count,
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.text.cmp(&b.text))
            .then_with(|| a.entity_type.cmp(&b.entity_type))
    });
    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::ArticleEntity;
    use chrono::Utc;

    fn article(entities: &[(&str, &str, u32)]) -> Article {
        Article {
            article_id: "x".to_string(),
            headline: String::new(),
            source: String::new(),
            published_at: Utc::now(),
            embedding: Vec::new(),
            entities: entities
                .iter()
                .map(|(text, entity_type, count)| ArticleEntity {
                    text: text.to_string(),
                    entity_type: entity_type.to_string(),
                    count: *count,
                })
                .collect(),
            locations: Vec::new(),
        }
    }

    #[test]
    fn test_counts_are_summed_per_text_and_type() {
        let a = article(&[("NATO", "ORG", 2), ("Kyiv", "GPE", 1)]);
        let b = article(&[("NATO", "ORG", 3), ("NATO", "PERSON", 1), ("  ", "ORG", 9)]);

        let top = aggregate_entities(&[&a, &b], 10);
        assert_eq!(
            top,
            vec![
                TopEntity {
                    text: "NATO".to_string(),
                    entity_type: "ORG".to_string(),
                    count: 5
                },
                TopEntity {
                    text: "Kyiv".to_string(),
                    entity_type: "GPE".to_string(),
                    count: 1
                },
                TopEntity {
                    text: "NATO".to_string(),
                    entity_type: "PERSON".to_string(),
                    count: 1
                },
            ]
        );
    }

    #[test]
    fn test_zero_count_entities_are_not_ranked() {
        let a = article(&[("Lisbon", "GPE", 0), ("Porto", "GPE", 2)]);
        let b = article(&[("Lisbon", "GPE", 0), ("Braga", "GPE", 0)]);

        let top = aggregate_entities(&[&a, &b], 10);
        assert_eq!(
            top,
            vec![TopEntity {
                text: "Porto".to_string(),
                entity_type: "GPE".to_string(),
                count: 2
            }]
        );
    }

    #[test]
    fn test_limit_is_applied_after_ranking() {
        let entities: Vec<(String, u32)> = (0..15).map(|i| (format!("E{:02}", i), i)).collect();
        let refs: Vec<(&str, &str, u32)> = entities
            .iter()
            .map(|(text, count)| (text.as_str(), "ORG", *count))
            .collect();
        let a = article(&refs);

        let top = aggregate_entities(&[&a], 10);
        assert_eq!(top.len(), 10);
        assert_eq!(top[0].text, "E14");
        assert_eq!(top[9].text, "E05");
        assert!(aggregate_entities(&[&a], 0).is_empty());
    }
}
