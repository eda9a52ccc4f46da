//! Property tests for the pipeline invariants.

use proptest::prelude::*;

use wiggle::core::merge::{MergeKind, make_merger};
use wiggle::core::render::print_merge;
use wiggle::{Granularity, SplitMode, TokenFile, diff};

fn all_modes() -> Vec<SplitMode> {
    let mut modes = Vec::new();
    for granularity in [Granularity::Lines, Granularity::Words] {
        for ignore_blanks in [false, true] {
            for whole_word in [false, true] {
                modes.push(SplitMode { granularity, ignore_blanks, whole_word });
            }
        }
    }
    modes
}

/// Reference O(NM) dynamic program for the LCS length.
fn reference_lcs(a: &TokenFile<'_>, b: &TokenFile<'_>) -> usize {
    let (n, m) = (a.len(), b.len());
    let mut dp = vec![0usize; (n + 1) * (m + 1)];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            dp[i * (m + 1) + j] = if a.matches(i, b, j) {
                dp[(i + 1) * (m + 1) + j + 1] + 1
            } else {
                dp[(i + 1) * (m + 1) + j].max(dp[i * (m + 1) + j + 1])
            };
        }
    }
    dp[0]
}

/// Small line-structured texts over a tiny alphabet, to force collisions.
fn text_strategy() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        proptest::sample::select(vec!["a", "b", "c", "xy", "a b", "  ", ""]),
        0..12,
    )
    .prop_map(|lines| {
        let mut s = lines.join("\n");
        if !s.is_empty() {
            s.push('\n');
        }
        s
    })
}

proptest! {
    #[test]
    fn tokenizer_reconstructs_input_under_every_mode(data in proptest::collection::vec(any::<u8>(), 0..200)) {
        for mode in all_modes() {
            let f = TokenFile::split(&data, mode);
            let mut rebuilt = Vec::new();
            for i in 0..f.len() {
                rebuilt.extend_from_slice(f.printed(i));
            }
            prop_assert_eq!(&rebuilt, &data, "mode {:?}", mode);
        }
    }

    #[test]
    fn csl_is_monotone_terminated_and_longest(a in text_strategy(), b in text_strategy()) {
        for mode in [SplitMode::lines(), SplitMode::words()] {
            let fa = TokenFile::split(a.as_bytes(), mode);
            let fb = TokenFile::split(b.as_bytes(), mode);
            let csl = diff(&fa, &fb);

            let last = csl.last().expect("terminator");
            prop_assert_eq!((last.a, last.b, last.len), (fa.len(), fb.len(), 0));

            let mut pa = 0;
            let mut pb = 0;
            for e in &csl {
                prop_assert!(e.a >= pa && e.b >= pb, "overlapping entries");
                for i in 0..e.len {
                    prop_assert!(fa.matches(e.a + i, &fb, e.b + i), "false match");
                }
                pa = e.a + e.len;
                pb = e.b + e.len;
            }

            let total: usize = csl.iter().map(|e| e.len).sum();
            prop_assert_eq!(total, reference_lcs(&fa, &fb), "not longest");
        }
    }

    #[test]
    fn merge_sections_tile_all_three_files(a in text_strategy(), b in text_strategy(), c in text_strategy()) {
        let fa = TokenFile::split(a.as_bytes(), SplitMode::lines());
        let fb = TokenFile::split(b.as_bytes(), SplitMode::lines());
        let fc = TokenFile::split(c.as_bytes(), SplitMode::lines());
        let csl1 = diff(&fa, &fb);
        let csl2 = diff(&fb, &fc);
        let r = make_merger(&fa, &fb, &fc, &csl1, &csl2, false, true, false);

        let al: usize = r.merger.iter().map(|m| m.al).sum();
        let bl: usize = r.merger.iter().map(|m| m.bl).sum();
        let cl: usize = r.merger.iter().map(|m| m.cl).sum();
        prop_assert_eq!((al, bl, cl), (fa.len(), fb.len(), fc.len()));
    }

    #[test]
    fn identity_merge_renders_the_original(a in text_strategy(), b in text_strategy()) {
        // B == C: nothing changed, so the output is the original and every
        // section is benign.
        let fa = TokenFile::split(a.as_bytes(), SplitMode::lines());
        let fb = TokenFile::split(b.as_bytes(), SplitMode::lines());
        let fc = TokenFile::split(b.as_bytes(), SplitMode::lines());
        let csl1 = diff(&fa, &fb);
        let csl2 = diff(&fb, &fc);
        let r = make_merger(&fa, &fb, &fc, &csl1, &csl2, false, true, false);

        prop_assert_eq!(r.conflicts, 0);
        prop_assert!(r.merger.iter().all(|m| matches!(
            m.kind,
            MergeKind::Unchanged | MergeKind::Unmatched | MergeKind::Extraneous | MergeKind::End
        )));

        let mut out = Vec::new();
        print_merge(&mut out, &fa, &fb, &fc, false, &r.merger).unwrap();
        prop_assert_eq!(String::from_utf8(out).unwrap(), a);
    }

    #[test]
    fn trivial_apply_renders_the_replacement(b in text_strategy(), c in text_strategy()) {
        // A == B: the patch context matches exactly, so the output is C.
        let fa = TokenFile::split(b.as_bytes(), SplitMode::lines());
        let fb = TokenFile::split(b.as_bytes(), SplitMode::lines());
        let fc = TokenFile::split(c.as_bytes(), SplitMode::lines());
        let csl1 = diff(&fa, &fb);
        let csl2 = diff(&fb, &fc);
        let r = make_merger(&fa, &fb, &fc, &csl1, &csl2, false, true, false);

        prop_assert_eq!(r.conflicts, 0);
        let mut out = Vec::new();
        print_merge(&mut out, &fa, &fb, &fc, false, &r.merger).unwrap();
        prop_assert_eq!(String::from_utf8(out).unwrap(), c);
    }

    #[test]
    fn isolator_is_idempotent(a in text_strategy(), b in text_strategy(), c in text_strategy()) {
        use wiggle::core::merge::isolate_conflicts;

        let fa = TokenFile::split(a.as_bytes(), SplitMode::lines());
        let fb = TokenFile::split(b.as_bytes(), SplitMode::lines());
        let fc = TokenFile::split(c.as_bytes(), SplitMode::lines());
        let csl1 = diff(&fa, &fb);
        let csl2 = diff(&fb, &fc);
        let mut r = make_merger(&fa, &fb, &fc, &csl1, &csl2, false, true, false);

        let first: Vec<_> = r.merger.iter().map(|m| (m.in_conflict, m.lo, m.hi)).collect();
        let counts = isolate_conflicts(&fa, &fb, &fc, false, &mut r.merger, false);
        let second: Vec<_> = r.merger.iter().map(|m| (m.in_conflict, m.lo, m.hi)).collect();
        prop_assert_eq!(first, second);
        prop_assert_eq!(counts, (r.conflicts, r.wiggles));
    }
}
