use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use filterlink_proto::{ChainBlob, FilterDescriptor, Packet, PacketType};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct PacketOutput<'a> {
    packet_type: &'a str,
    type_id: u8,
    summary: String,
    fields: Value,
    timestamp: String,
}

#[derive(Serialize)]
struct FilterOutput<'a> {
    index: usize,
    name: &'a str,
    slug: &'a str,
    params: Vec<ParamOutput<'a>>,
}

#[derive(Serialize)]
struct ParamOutput<'a> {
    name: &'a str,
    slug: &'a str,
    offset: Option<u8>,
    format: Option<String>,
}

#[derive(Serialize)]
struct SentOutput<'a> {
    packet_type: &'a str,
    type_id: u8,
    payload_size: usize,
    payload_hex: String,
}

pub fn print_packet(packet: &Packet, format: OutputFormat) {
    let ty = packet.packet_type();
    match format {
        OutputFormat::Json => {
            let out = PacketOutput {
                packet_type: ty.name(),
                type_id: ty.as_u8(),
                summary: summary(packet),
                fields: fields(packet),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["TYPE", "SUMMARY"]);
            table.add_row(vec![ty.name().to_string(), summary(packet)]);
            println!("{table}");
            match packet {
                Packet::FilterList(list) => println!("{}", filters_table(&list.filters)),
                Packet::ChainBlob(chain) => println!("{}", chain_table(chain)),
                _ => {}
            }
        }
        OutputFormat::Pretty => {
            println!("type={} {}", ty.name(), summary(packet));
            for line in detail_lines(packet) {
                println!("  {line}");
            }
        }
    }
}

pub fn print_filters(filters: &[FilterDescriptor], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out: Vec<FilterOutput<'_>> = filters.iter().map(filter_output).collect();
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "[]".to_string())
            );
        }
        OutputFormat::Table => println!("{}", filters_table(filters)),
        OutputFormat::Pretty => {
            for filter in filters {
                println!("{}: {} ({})", filter.index, filter.name, filter.slug);
                for param in &filter.params {
                    println!("  {}", param_label(param));
                }
            }
        }
    }
}

pub fn print_sent(packet_type: PacketType, payload: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = SentOutput {
                packet_type: packet_type.name(),
                type_id: packet_type.as_u8(),
                payload_size: payload.len(),
                payload_hex: hex::encode(payload),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["SENT", "SIZE", "PAYLOAD"]);
            table.add_row(vec![
                packet_type.name().to_string(),
                payload.len().to_string(),
                hex::encode(payload),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "sent type={} size={} payload={}",
                packet_type.name(),
                payload.len(),
                hex::encode(payload)
            );
        }
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn filters_table(filters: &[FilterDescriptor]) -> Table {
    let mut table = new_table(vec!["INDEX", "NAME", "SLUG", "PARAMS"]);
    for filter in filters {
        let params: Vec<String> = filter.params.iter().map(param_label).collect();
        table.add_row(vec![
            filter.index.to_string(),
            filter.name.clone(),
            filter.slug.clone(),
            params.join("\n"),
        ]);
    }
    table
}

fn chain_table(chain: &ChainBlob) -> Table {
    let mut table = new_table(vec!["STAGE", "BRANCH", "FILTER", "MIX", "FLAGS", "PARAMS"]);
    for (stage_index, stage) in chain.stages.iter().enumerate() {
        for (branch_index, branch) in stage.branches.iter().enumerate() {
            let params: Vec<String> = branch
                .params
                .iter()
                .map(|p| format!("{}={}", p.slug, p.value))
                .collect();
            table.add_row(vec![
                stage_index.to_string(),
                branch_index.to_string(),
                branch.filter_name.clone(),
                branch.mix.to_string(),
                format!("{:#04x}", branch.flags.bits()),
                params.join("\n"),
            ]);
        }
    }
    table
}

fn param_label(param: &filterlink_proto::ParamDescriptor) -> String {
    match (param.offset(), param.format()) {
        (Some(offset), Ok(format)) => format!("{} @{offset} ({format})", param.name),
        _ => param.name.clone(),
    }
}

fn filter_output(filter: &FilterDescriptor) -> FilterOutput<'_> {
    FilterOutput {
        index: filter.index,
        name: &filter.name,
        slug: &filter.slug,
        params: filter
            .params
            .iter()
            .map(|p| ParamOutput {
                name: &p.name,
                slug: &p.slug,
                offset: p.offset(),
                format: p.format().ok().map(|f| f.to_string()),
            })
            .collect(),
    }
}

/// One-line description of a packet.
pub fn summary(packet: &Packet) -> String {
    match packet {
        Packet::Probe(_) => "probe".to_string(),
        Packet::Reset(_) => "reset".to_string(),
        Packet::Print(p) => p.text.trim_end().to_string(),
        Packet::FilterList(list) => format!("{} filters", list.filters.len()),
        Packet::FilterCreate(c) => format!(
            "stage={} filter={} flags={:#04x} mix={}",
            c.stage,
            c.filter_type,
            c.flags.bits(),
            c.mix
        ),
        Packet::FilterDelete(d) => format!("stage={} branch={}", d.stage, d.branch),
        Packet::FilterFlag(f) => format!(
            "stage={} branch={} bit={} enable={}",
            f.stage, f.branch, f.bit, f.enable
        ),
        Packet::FilterMod(m) => format!(
            "stage={} branch={} offset={} format={} value={}",
            m.stage, m.branch, m.offset, m.format, m.value
        ),
        Packet::FilterMix(m) => format!("stage={} branch={} mix={}", m.stage, m.branch, m.mix),
        Packet::Command(c) => c.tokens.join(" "),
        Packet::AnalogControl(a) => format!("value={}", a.value),
        Packet::StoredList(s) => s.names.join(", "),
        Packet::ChainBlob(chain) => format!(
            "{} stages, {} branches",
            chain.stages.len(),
            chain.branch_count()
        ),
    }
}

fn fields(packet: &Packet) -> Value {
    match packet {
        Packet::Probe(_) | Packet::Reset(_) => json!({}),
        Packet::Print(p) => json!({ "text": p.text }),
        Packet::FilterList(list) => {
            let filters: Vec<FilterOutput<'_>> = list.filters.iter().map(filter_output).collect();
            json!({ "filters": filters })
        }
        Packet::FilterCreate(c) => json!({
            "stage": c.stage,
            "filter_type": c.filter_type,
            "flags": c.flags.bits(),
            "mix": c.mix,
        }),
        Packet::FilterDelete(d) => json!({ "stage": d.stage, "branch": d.branch }),
        Packet::FilterFlag(f) => json!({
            "stage": f.stage,
            "branch": f.branch,
            "bit": f.bit,
            "enable": f.enable,
        }),
        Packet::FilterMod(m) => json!({
            "stage": m.stage,
            "branch": m.branch,
            "offset": m.offset,
            "format": m.format.to_string(),
            "value": m.value,
        }),
        Packet::FilterMix(m) => json!({ "stage": m.stage, "branch": m.branch, "mix": m.mix }),
        Packet::Command(c) => json!({ "tokens": c.tokens }),
        Packet::AnalogControl(a) => json!({ "value": a.value }),
        Packet::StoredList(s) => json!({ "names": s.names }),
        Packet::ChainBlob(chain) => {
            let stages: Vec<Value> = chain
                .stages
                .iter()
                .map(|stage| {
                    let branches: Vec<Value> = stage
                        .branches
                        .iter()
                        .map(|b| {
                            let params: Vec<Value> = b
                                .params
                                .iter()
                                .map(|p| {
                                    json!({
                                        "name": p.name,
                                        "slug": p.slug,
                                        "offset": p.offset,
                                        "format": p.format.to_string(),
                                        "value": p.value.as_f64(),
                                    })
                                })
                                .collect();
                            json!({
                                "filter": b.filter_index,
                                "filter_name": b.filter_name,
                                "filter_slug": b.filter_slug,
                                "flags": b.flags.bits(),
                                "mix": b.mix,
                                "params": params,
                            })
                        })
                        .collect();
                    json!({ "branches": branches })
                })
                .collect();
            json!({ "version": chain.version, "stages": stages })
        }
    }
}

fn detail_lines(packet: &Packet) -> Vec<String> {
    match packet {
        Packet::FilterList(list) => list
            .filters
            .iter()
            .map(|f| {
                let params: Vec<String> = f.params.iter().map(param_label).collect();
                format!("{}: {} [{}]", f.index, f.name, params.join(", "))
            })
            .collect(),
        Packet::ChainBlob(chain) => {
            let mut lines = Vec::new();
            for (s, stage) in chain.stages.iter().enumerate() {
                for (b, branch) in stage.branches.iter().enumerate() {
                    let params: Vec<String> = branch
                        .params
                        .iter()
                        .map(|p| format!("{}={}", p.slug, p.value))
                        .collect();
                    lines.push(format!(
                        "stage {s} branch {b}: {} mix={} {}",
                        branch.filter_slug,
                        branch.mix,
                        params.join(" ")
                    ));
                }
            }
            lines
        }
        _ => Vec::new(),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use filterlink_proto::{
        parse_params, Branch, BranchFlags, Command, FilterList, FilterMod, ParamFormat,
        ParamValue, Print, ResolvedParam, Stage,
    };

    use super::*;

    fn chain() -> ChainBlob {
        ChainBlob {
            version: 1,
            stages: vec![Stage {
                branches: vec![Branch {
                    filter_index: 0,
                    filter_name: "Low Pass".into(),
                    filter_slug: "low-pass".into(),
                    flags: BranchFlags::FULL_MIX,
                    mix: 1.0,
                    params: vec![ResolvedParam {
                        name: "Cutoff".into(),
                        slug: "cutoff".into(),
                        offset: 0,
                        format: ParamFormat::F32,
                        value: ParamValue::Float(440.0),
                    }],
                }],
            }],
        }
    }

    #[test]
    fn summaries() {
        let print = Packet::Print(Print {
            text: "ready\r\n".into(),
        });
        assert_eq!(summary(&print), "ready");

        let command = Packet::Command(Command::parse("chain save live"));
        assert_eq!(summary(&command), "chain save live");

        let modify = Packet::FilterMod(FilterMod {
            stage: 1,
            branch: 0,
            offset: 4,
            format: ParamFormat::U16,
            value: 3.0,
        });
        assert_eq!(
            summary(&modify),
            "stage=1 branch=0 offset=4 format=H value=3"
        );

        assert_eq!(
            summary(&Packet::ChainBlob(chain())),
            "1 stages, 1 branches"
        );
    }

    #[test]
    fn chain_fields_carry_resolved_params() {
        let value = fields(&Packet::ChainBlob(chain()));
        let param = &value["stages"][0]["branches"][0]["params"][0];
        assert_eq!(param["slug"], "cutoff");
        assert_eq!(param["format"], "f");
        assert_eq!(param["value"], 440.0);
        assert_eq!(value["stages"][0]["branches"][0]["flags"], 1);
    }

    #[test]
    fn filter_list_details() {
        let filters = vec![FilterDescriptor::new(
            0,
            "Gain",
            parse_params("Level;o=0;f=f|Note", false).unwrap(),
        )];
        let lines = detail_lines(&Packet::FilterList(FilterList {
            filters: filters.clone(),
        }));
        assert_eq!(lines, vec!["0: Gain [Level @0 (f), Note]"]);

        let value = fields(&Packet::FilterList(FilterList { filters }));
        assert_eq!(value["filters"][0]["params"][0]["offset"], 0);
        assert!(value["filters"][0]["params"][1]["offset"].is_null());
    }
}
