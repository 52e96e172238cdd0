//! Seed data: the built-in DSA catalog that keeps the app useful without external config.

use std::collections::BTreeMap;

use crate::domain::{Difficulty, Problem, Topic};

const CORE_SCOPE: &str = "core";

/// (topic id, display name, [(problem id, difficulty, title)])
type SeedTopic = (&'static str, &'static str, &'static [(&'static str, Difficulty, &'static str)]);

const SEED_TOPICS: &[SeedTopic] = &[
  ("arrays", "Arrays", &[
    ("two-sum", Difficulty::Easy, "Two Sum"),
    ("best-time-stock", Difficulty::Easy, "Best Time to Buy and Sell Stock"),
    ("product-except-self", Difficulty::Medium, "Product of Array Except Self"),
    ("three-sum", Difficulty::Medium, "3Sum"),
    ("trapping-rain-water", Difficulty::Hard, "Trapping Rain Water"),
  ]),
  ("strings", "Strings", &[
    ("valid-anagram", Difficulty::Easy, "Valid Anagram"),
    ("longest-substring-no-repeat", Difficulty::Medium, "Longest Substring Without Repeating Characters"),
    ("minimum-window-substring", Difficulty::Hard, "Minimum Window Substring"),
  ]),
  ("linked-lists", "Linked Lists", &[
    ("reverse-linked-list", Difficulty::Easy, "Reverse Linked List"),
    ("merge-two-lists", Difficulty::Easy, "Merge Two Sorted Lists"),
    ("reorder-list", Difficulty::Medium, "Reorder List"),
    ("merge-k-lists", Difficulty::Hard, "Merge k Sorted Lists"),
  ]),
  ("stacks-queues", "Stacks & Queues", &[
    ("valid-parentheses", Difficulty::Easy, "Valid Parentheses"),
    ("daily-temperatures", Difficulty::Medium, "Daily Temperatures"),
    ("largest-rectangle-histogram", Difficulty::Hard, "Largest Rectangle in Histogram"),
  ]),
  ("trees", "Trees", &[
    ("max-depth-binary-tree", Difficulty::Easy, "Maximum Depth of Binary Tree"),
    ("validate-bst", Difficulty::Medium, "Validate Binary Search Tree"),
    ("level-order-traversal", Difficulty::Medium, "Binary Tree Level Order Traversal"),
    ("serialize-binary-tree", Difficulty::Hard, "Serialize and Deserialize Binary Tree"),
  ]),
  ("graphs", "Graphs", &[
    ("flood-fill", Difficulty::Easy, "Flood Fill"),
    ("number-of-islands", Difficulty::Medium, "Number of Islands"),
    ("course-schedule", Difficulty::Medium, "Course Schedule"),
    ("word-ladder", Difficulty::Hard, "Word Ladder"),
  ]),
  ("dynamic-programming", "Dynamic Programming", &[
    ("climbing-stairs", Difficulty::Easy, "Climbing Stairs"),
    ("coin-change", Difficulty::Medium, "Coin Change"),
    ("longest-increasing-subsequence", Difficulty::Medium, "Longest Increasing Subsequence"),
    ("edit-distance", Difficulty::Hard, "Edit Distance"),
  ]),
  ("sorting-searching", "Sorting & Searching", &[
    ("binary-search", Difficulty::Easy, "Binary Search"),
    ("search-rotated-array", Difficulty::Medium, "Search in Rotated Sorted Array"),
    ("median-two-sorted-arrays", Difficulty::Hard, "Median of Two Sorted Arrays"),
  ]),
];

pub fn seed_topics() -> Vec<Topic> {
  SEED_TOPICS
    .iter()
    .map(|(id, name, _)| Topic { topic_id: id.to_string(), name: name.to_string(), scopes: vec![CORE_SCOPE.into()] })
    .collect()
}

pub fn seed_problems() -> Vec<Problem> {
  SEED_TOPICS
    .iter()
    .flat_map(|(topic, _, problems)| {
      problems.iter().map(move |(id, difficulty, title)| Problem {
        problem_id: id.to_string(),
        topic_id: topic.to_string(),
        difficulty: *difficulty,
        title: title.to_string(),
        metadata: BTreeMap::from([("source".to_string(), "seed".to_string())]),
      })
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashSet;

  #[test]
  fn every_seed_topic_has_problems_at_each_difficulty() {
    let problems = seed_problems();
    for topic in seed_topics() {
      for d in Difficulty::ALL {
        assert!(
          problems.iter().any(|p| p.topic_id == topic.topic_id && p.difficulty == d),
          "{} lacks {:?}",
          topic.topic_id,
          d
        );
      }
    }
  }

  #[test]
  fn seed_problem_ids_are_unique() {
    let problems = seed_problems();
    let ids: HashSet<_> = problems.iter().map(|p| p.problem_id.as_str()).collect();
    assert_eq!(ids.len(), problems.len());
  }
}
