use quickcheck_macros::quickcheck;

use localqa_core::types::{PassageVector, RankedPassage};
use localqa_pipeline::prompt::render;
use localqa_pipeline::PromptAssembler;

fn words(s: &str) -> usize { s.split_whitespace().count() }

fn ranked(texts: &[String]) -> Vec<RankedPassage> {
    texts
        .iter()
        .enumerate()
        .map(|(rank, t)| RankedPassage {
            passage: PassageVector::new(format!("p{rank}"), format!("doc{rank}.txt"), t.clone(), vec![]),
            rank,
            score: 1.0 - rank as f32 * 0.1,
        })
        .collect()
}

#[test]
fn renders_the_stuff_template() {
    let prompt = render("What is X?", &ranked(&["X is a letter.".into(), "X follows W.".into()]));
    assert_eq!(
        prompt,
        "Use the following pieces of context to answer the question at the end. If you don't know the answer, \
just say that you don't know, don't try to make up an answer.\n\nX is a letter.\n\nX follows W.\n\nQuestion: What is X?\nHelpful Answer:"
    );
}

#[test]
fn budget_reserves_room_for_the_answer() {
    assert_eq!(PromptAssembler::new(1000, 256).budget(), 744);
    assert_eq!(PromptAssembler::new(100, 256).budget(), 0);
}

#[test]
fn passages_are_restored_to_rank_order() {
    let mut passages = ranked(&["first".into(), "second".into(), "third".into()]);
    passages.reverse();
    let out = PromptAssembler::with_budget(10_000).assemble("q", passages, words);
    assert_eq!(out.passages.iter().map(|p| p.rank).collect::<Vec<_>>(), vec![0, 1, 2]);
    assert!(out.prompt.as_str().find("first") < out.prompt.as_str().find("third"));
}

#[test]
fn oversized_prompt_without_passages_is_returned_as_is() {
    let out = PromptAssembler::with_budget(1).assemble("a long question", ranked(&["ctx".into()]), words);
    assert!(out.passages.is_empty());
    assert_eq!(out.dropped, 1);
    assert_eq!(out.prompt.as_str(), render("a long question", &[]));
}

#[quickcheck]
fn assembly_is_deterministic(query: String, texts: Vec<String>, budget: u16) -> bool {
    let assembler = PromptAssembler::with_budget(budget as usize);
    let a = assembler.assemble(&query, ranked(&texts), words);
    let b = assembler.assemble(&query, ranked(&texts), words);
    a == b
}

#[quickcheck]
fn truncation_keeps_a_rank_prefix_that_fits(query: String, texts: Vec<String>, budget: u16) -> bool {
    let budget = budget as usize;
    let input = ranked(&texts);
    let out = PromptAssembler::with_budget(budget).assemble(&query, input.clone(), words);
    let kept = out.passages.len();
    let prefix = out.passages == input[..kept];
    let accounted = kept + out.dropped == input.len();
    let fits = kept == 0 || words(out.prompt.as_str()) <= budget;
    let maximal = kept == input.len() || words(&render(&query, &input[..=kept])) > budget;
    prefix && accounted && fits && maximal
}
