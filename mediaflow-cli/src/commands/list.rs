//! List registered components.

use clap::{Args, ValueEnum};
use console::style;
use mediaflow_codecs::find_codec_by_id;
use mediaflow_containers::{demuxers, muxers};
use mediaflow_core::{pix_fmts, sample_fmts, CodecId};
use mediaflow_filters::filters;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListKind {
    Codecs,
    Formats,
    Filters,
    PixFmts,
    SampleFmts,
}

/// One row of a listing.
#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    pub name: String,
    /// Capability flags such as `DE` for decode and encode.
    pub flags: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub description: String,
}

/// List codecs, formats, filters, pixel formats or sample formats.
#[derive(Args, Debug)]
pub struct CmdList {
    /// What to list
    #[arg(value_enum)]
    pub what: ListKind,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

fn flag(set: bool, c: char) -> char {
    if set {
        c
    } else {
        '.'
    }
}

fn codec_entries() -> Vec<ListEntry> {
    CodecId::ALL
        .iter()
        .filter_map(|&id| find_codec_by_id(id))
        .map(|entry| ListEntry {
            name: entry.info.name.to_string(),
            flags: format!(
                "{}{}",
                flag(entry.decoder.is_some(), 'D'),
                flag(entry.encoder.is_some(), 'E')
            ),
            kind: Some(entry.info.codec_type.to_string()),
            description: entry.info.long_name.to_string(),
        })
        .collect()
}

fn format_entries() -> Vec<ListEntry> {
    let mut names: Vec<&str> = demuxers().keys().chain(muxers().keys()).copied().collect();
    names.sort_unstable();
    names.dedup();
    names
        .into_iter()
        .map(|name| {
            let demuxer = demuxers().get(name);
            let muxer = muxers().get(name);
            let description = demuxer
                .map(|d| d.long_name)
                .or_else(|| muxer.map(|m| m.long_name))
                .unwrap_or_default();
            ListEntry {
                name: name.to_string(),
                flags: format!("{}{}", flag(demuxer.is_some(), 'D'), flag(muxer.is_some(), 'E')),
                kind: None,
                description: description.to_string(),
            }
        })
        .collect()
}

fn filter_entries() -> Vec<ListEntry> {
    filters()
        .values()
        .map(|f| ListEntry {
            name: f.name.to_string(),
            flags: format!("{}->{}", f.inputs, f.outputs),
            kind: Some(f.media_type.to_string()),
            description: f.description.to_string(),
        })
        .collect()
}

fn pix_fmt_entries() -> Vec<ListEntry> {
    pix_fmts()
        .values()
        .map(|d| ListEntry {
            name: d.name.to_string(),
            flags: format!("{}p{}c", d.nb_planes, d.nb_components),
            kind: None,
            description: format!(
                "{} bpp, chroma shift {}x{}",
                d.bits_per_pixel, d.log2_chroma_w, d.log2_chroma_h
            ),
        })
        .collect()
}

fn sample_fmt_entries() -> Vec<ListEntry> {
    sample_fmts()
        .values()
        .map(|d| ListEntry {
            name: d.name.to_string(),
            flags: if d.planar { "P" } else { "." }.to_string(),
            kind: None,
            description: format!("{} bits, packed form {}", d.bits, d.packed),
        })
        .collect()
}

impl CmdList {
    pub fn entries(&self) -> Vec<ListEntry> {
        match self.what {
            ListKind::Codecs => codec_entries(),
            ListKind::Formats => format_entries(),
            ListKind::Filters => filter_entries(),
            ListKind::PixFmts => pix_fmt_entries(),
            ListKind::SampleFmts => sample_fmt_entries(),
        }
    }

    pub fn run(&self) -> anyhow::Result<()> {
        let entries = self.entries();
        if self.json {
            println!("{}", serde_json::to_string_pretty(&entries)?);
            return Ok(());
        }

        let title = match self.what {
            ListKind::Codecs => "Codecs",
            ListKind::Formats => "Formats",
            ListKind::Filters => "Filters",
            ListKind::PixFmts => "Pixel formats",
            ListKind::SampleFmts => "Sample formats",
        };
        println!();
        println!("{}", style(title).cyan().bold());
        println!();
        for entry in &entries {
            println!(
                "  {:<6} {:<12} {:<6} {}",
                style(&entry.flags).green(),
                style(&entry.name).yellow(),
                entry.kind.as_deref().unwrap_or(""),
                entry.description
            );
        }
        println!();
        match self.what {
            ListKind::Codecs | ListKind::Formats => println!(
                "{}: {} = Decode/Demux, {} = Encode/Mux",
                style("Legend").dim(),
                style("D").green(),
                style("E").green()
            ),
            ListKind::Filters => println!(
                "{}: inputs->outputs, N = set by arguments",
                style("Legend").dim()
            ),
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(what: ListKind) -> Vec<ListEntry> {
        CmdList { what, json: true }.entries()
    }

    #[test]
    fn test_codecs_listed_with_flags() {
        let codecs = list(ListKind::Codecs);
        let delta = codecs.iter().find(|c| c.name == "delta").unwrap();
        assert_eq!(delta.flags, "DE");
        assert_eq!(delta.kind.as_deref(), Some("video"));
        assert!(codecs.iter().any(|c| c.name == "pcm_s16le"));
    }

    #[test]
    fn test_formats_merge_demuxers_and_muxers() {
        let formats = list(ListKind::Formats);
        let mpk = formats.iter().find(|f| f.name == "mpk").unwrap();
        assert_eq!(mpk.flags, "DE");
        let null = formats.iter().find(|f| f.name == "null").unwrap();
        assert_eq!(null.flags, ".E");
    }

    #[test]
    fn test_filters_and_sample_fmts() {
        let filters = list(ListKind::Filters);
        assert!(filters.iter().any(|f| f.name == "scale" && f.flags == "1->1"));
        let fmts = list(ListKind::SampleFmts);
        assert_eq!(fmts.iter().find(|f| f.name == "s16p").unwrap().flags, "P");
    }

    #[test]
    fn test_entry_serialization() {
        let json = serde_json::to_string(&list(ListKind::Codecs)[0]).unwrap();
        assert!(json.contains("\"type\""));
        let json = serde_json::to_string(&list(ListKind::PixFmts)[0]).unwrap();
        assert!(!json.contains("\"type\""));
    }
}
