
use anyhow::Result;
use fixtures::{PanarooTree, ISO1_CTG1, ISO1_CTG2, ISO2_CTG1};
use panaroo_update::gff::GffDocument;
use panaroo_update::rewrite::OutputLayout;
use panaroo_update::{run, UpdateError};
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::fs;

const GENE_A_ISO1: &str = "ID=iso1_refound_1;gbkey=CDS;gene=geneA;gene_biotype=protein_coding;product=efflux pump;locus_tag=PN_51";
const GENE_B_ISO1: &str = "ID=iso1_refound_2;gbkey=CDS;gene=geneB;gene_biotype=protein_coding;product=hypothetical protein;locus_tag=PN_52";

#[test]
fn test_per_contig_output_for_both_isolates() -> Result<()> {
    let tree = PanarooTree::new();
    let summary = run(&tree.config())?;

    // Seed PN_50; iso1 emits geneA, geneB, geneC; iso2 emits geneA
    assert_eq!(summary.seed_locus_tag, 50);
    assert_eq!(summary.last_locus_tag, 54);
    assert_eq!(summary.candidates(), 4);
    assert_eq!(summary.placed(), 3);
    assert!(summary.skipped.is_empty());

    let iso1 = fs::read_to_string(tree.path("out/iso1.gff"))?;
    let fasta1 = format!("##FASTA\n>iso1_ctg1\n{ISO1_CTG1}\n>iso1_ctg2\n{ISO1_CTG2}\n\n");
    let expected1 = format!(
        "##sequence-region iso1_ctg1 1 39\n\
iso1_ctg1\tPanaroo\tCDS\t1\t6\t.\t+\t0\tID=iso1_00001\n\
iso1_ctg1\tPanaroo\tCDS\t7\t15\t.\t+\t0\t{GENE_A_ISO1}\n\
iso1_ctg1\tPanaroo\tCDS\t19\t28\t.\t-\t0\t{GENE_B_ISO1}\n\
iso1_ctg1\tPanaroo\tCDS\t32\t39\t.\t-\t0\tID=iso1_00002\n\
{fasta1}"
    );
    assert_eq!(iso1, expected1);

    // geneA lands on start 23 of iso2, where an existing feature already starts
    let iso2 = fs::read_to_string(tree.path("out/iso2.gff"))?;
    let expected2 = format!(
        "##sequence-region iso2_ctg1 1 35\n\
iso2_ctg1\tPanaroo\tCDS\t1\t5\t.\t-\t0\tID=iso2_00002\n\
iso2_ctg1\tPanaroo\tCDS\t23\t33\t.\t+\t0\tID=iso2_00001\n\
##FASTA\n>iso2_ctg1\n{ISO2_CTG1}\n\n"
    );
    assert_eq!(iso2, expected2);
    assert!(!iso2.contains("PN_54"));

    Ok(())
}

#[test]
fn test_merged_layout_is_a_single_valid_document() -> Result<()> {
    let tree = PanarooTree::new();
    let mut config = tree.config();
    config.layout = OutputLayout::Merged;
    run(&config)?;

    let text = fs::read_to_string(tree.path("out/iso1.gff"))?;
    assert_eq!(text.matches("##FASTA").count(), 1);
    assert!(text.starts_with("##gff-version 3\n##sequence-region iso1_ctg1 1 39\n"));

    let doc = GffDocument::parse(&text).map_err(anyhow::Error::msg)?;
    let regions: Vec<_> = doc.regions.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(regions, vec!["iso1_ctg1"]);
    let starts: Vec<_> = doc.features.iter().map(|r| r.start).collect();
    assert_eq!(starts, vec![1, 7, 19, 32]);
    assert!(doc.features.iter().all(|r| r.source == "Panaroo" && r.score == "."));
    assert_eq!(doc.sequence("iso1_ctg2"), Some(ISO1_CTG2));

    Ok(())
}

#[test]
fn test_locus_tags_unique_and_monotonic() -> Result<()> {
    let tree = PanarooTree::new();
    let summary = run(&tree.config())?;

    let per_isolate: Vec<_> = summary.isolates.iter().map(|s| s.candidates as u64).collect();
    assert_eq!(per_isolate, vec![3, 1]);
    assert_eq!(
        summary.last_locus_tag,
        summary.seed_locus_tag + per_isolate.iter().sum::<u64>()
    );

    let mut tags = Vec::new();
    for isolate in ["iso1", "iso2"] {
        let text = fs::read_to_string(tree.path(&format!("out/{isolate}.gff")))?;
        let doc = GffDocument::parse(&text).map_err(anyhow::Error::msg)?;
        tags.extend(
            doc.features
                .iter()
                .filter_map(|r| r.attributes.split(';').find(|kv| kv.starts_with("locus_tag=PN_")))
                .map(str::to_string),
        );
    }
    let unique: HashSet<_> = tags.iter().collect();
    assert_eq!(unique.len(), tags.len(), "locus tag reused: {tags:?}");
    assert!(tags.iter().all(|t| t != "locus_tag=PN_50"));

    Ok(())
}

#[test]
fn test_output_defaults_to_gff_directory() -> Result<()> {
    let tree = PanarooTree::new();
    let config = panaroo_update::UpdateConfig::new(
        tree.path("gff"),
        tree.path("aln"),
        tree.path("all_annotations.csv"),
        tree.path("graph"),
    );
    run(&config)?;

    let rewritten = fs::read_to_string(tree.path("gff/iso1.gff"))?;
    assert!(rewritten.contains("locus_tag=PN_51"));
    assert!(tree.path("gff/Gene_frequencies.csv").exists());
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_rewrite_in_place_keeps_file_mode() -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let tree = PanarooTree::new();
    let input = tree.path("gff/iso1.gff");
    fs::set_permissions(&input, fs::Permissions::from_mode(0o644))?;
    fs::set_permissions(tree.path("gff/iso2.gff"), fs::Permissions::from_mode(0o640))?;

    let config = panaroo_update::UpdateConfig::new(
        tree.path("gff"),
        tree.path("aln"),
        tree.path("all_annotations.csv"),
        tree.path("graph"),
    );
    run(&config)?;

    assert!(fs::read_to_string(&input)?.contains("locus_tag=PN_51"));
    let mode = |rel: &str| -> Result<u32> {
        Ok(fs::metadata(tree.path(rel))?.permissions().mode() & 0o777)
    };
    assert_eq!(mode("gff/iso1.gff")?, 0o644);
    assert_eq!(mode("gff/iso2.gff")?, 0o640);
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_new_output_file_is_not_private() -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let tree = PanarooTree::new();
    run(&tree.config())?;

    // Created as 0o644 minus the umask, never the 0o600 of a bare temp file
    let mode = fs::metadata(tree.path("out/iso1.gff"))?.permissions().mode() & 0o777;
    assert_eq!(mode & 0o600, 0o600);
    assert_eq!(mode & 0o133, 0);
    let umask_probe = tree.path("umask_probe");
    fs::File::create(&umask_probe)?;
    let default_mode = fs::metadata(&umask_probe)?.permissions().mode() & 0o777;
    assert_eq!(mode, default_mode & 0o644);
    Ok(())
}

#[test]
fn test_gene_frequency_table() -> Result<()> {
    let tree = PanarooTree::new();
    run(&tree.config())?;

    let csv = fs::read_to_string(tree.path("out/Gene_frequencies.csv"))?;
    assert_eq!(
        csv,
        "Gene Name,Frequency (%)\ngenea,100.0\ngeneb,50.0\ngenec,50.0\ngened,100.0\n"
    );
    Ok(())
}

#[test]
fn test_missing_alignment_aborts_before_writing() {
    let tree = PanarooTree::new();
    fs::remove_file(tree.path("aln/geneC.aln.fas")).unwrap();

    let err = run(&tree.config()).unwrap_err();
    match err.downcast_ref::<UpdateError>() {
        Some(UpdateError::MissingInputFile { gene, .. }) => assert_eq!(gene, "geneC"),
        other => panic!("expected MissingInputFile, got {other:?}"),
    }
    assert!(!tree.path("out/iso1.gff").exists());
}

#[test]
fn test_malformed_isolate_aborts_by_default() {
    let tree = PanarooTree::new();
    let no_fasta = "##sequence-region c 1 4\nc\tP\tCDS\t1\t4\t.\t+\t0\tID=x\n";
    fs::write(tree.path("gff/iso0.gff"), no_fasta).unwrap();

    let err = run(&tree.config()).unwrap_err();
    match err.downcast_ref::<UpdateError>() {
        Some(UpdateError::MalformedAnnotation { isolate, reason }) => {
            assert_eq!(isolate, "iso0");
            assert!(reason.contains("##FASTA"));
        }
        other => panic!("expected MalformedAnnotation, got {other:?}"),
    }
}

#[test]
fn test_skip_malformed_keeps_tags_unchanged() -> Result<()> {
    let tree = PanarooTree::new();
    fs::write(tree.path("gff/iso0.gff"), "no directives at all\n").unwrap();

    let mut config = tree.config();
    config.skip_malformed = true;
    let summary = run(&config)?;

    assert_eq!(summary.skipped, vec!["iso0"]);
    assert_eq!(summary.last_locus_tag, 54);
    assert!(!tree.path("out/iso0.gff").exists());
    let iso1 = fs::read_to_string(tree.path("out/iso1.gff"))?;
    assert!(iso1.contains("locus_tag=PN_51"));
    Ok(())
}
