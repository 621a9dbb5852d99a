//! Composition emitter: accumulates per-step params, imports and workflow
//! wiring, in execution order, for the skeleton's three slots.

use crate::binding::ChannelBinding;
use crate::naming::NodeName;
use crate::template::TemplateSections;

/// Everything the composition needs to know about one emitted step.
#[derive(Debug, Clone)]
pub struct ComposedStep<'a> {
    pub name: &'a NodeName,
    /// Absolute source path.
    pub filename: &'a str,
    pub runtime: &'a str,
    pub cpu: Option<u64>,
    /// Non-blank dependencies, in declaration order.
    pub inputs: &'a [&'a str],
    /// Non-blank declared outputs, in declaration order.
    pub outputs: &'a [&'a str],
    pub bindings: &'a [ChannelBinding],
}

#[derive(Debug, Default)]
pub struct Composer {
    params: Vec<String>,
    imports: Vec<String>,
    /// One block per step: its channel declarations, then its invocation.
    workflow: Vec<String>,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_step(&mut self, step: &ComposedStep<'_>) {
        let name = step.name;
        let label = name.process_label();

        self.imports
            .push(format!("include  {{ {label} }} from \"./modules/{name}\""));

        if !self.params.is_empty() {
            self.params.push(String::new());
        }
        self.params.push(format!("params.{name}_filename=\"{}\"", step.filename));
        self.params.push(format!("params.{name}_runtime =\"{}\"", step.runtime));
        self.params.push(format!(
            "params.{name}_cpu=\"{}\"",
            step.cpu.map(|c| c.to_string()).unwrap_or_default()
        ));
        for (i, input) in step.inputs.iter().enumerate() {
            self.params
                .push(format!("params.{name}_input{}=\"{input}\"", i + 1));
        }
        for (j, output) in step.outputs.iter().enumerate() {
            self.params
                .push(format!("params.{name}_output{}=\"{output}\"", j + 1));
        }

        let channels: Vec<String> = step.bindings.iter().map(|b| b.statement(name)).collect();
        if !channels.is_empty() {
            self.workflow.push(channels.join("\n"));
        }
        let arguments: Vec<String> = step.bindings.iter().map(|b| b.channel_name(name)).collect();
        self.workflow
            .push(format!("{label}({})", arguments.join(", ")));
    }

    pub fn step_count(&self) -> usize {
        self.imports.len()
    }

    /// Slot contents, one entry per line.
    pub fn into_sections(self) -> TemplateSections {
        let workflow = self.workflow.join("\n\n");
        TemplateSections {
            params: self.params,
            imports: self.imports,
            workflow: if workflow.is_empty() {
                Vec::new()
            } else {
                workflow.split('\n').map(str::to_string).collect()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::ChannelSource;

    fn name_of(label: &str, id: &str) -> NodeName {
        let node = serde_json::from_value(serde_json::json!({
            "id": id,
            "type": "execution_node",
            "app_data": {"label": label},
        }))
        .unwrap();
        NodeName::resolve(&node).unwrap()
    }

    #[test]
    fn two_steps_compose_in_order() {
        let load = name_of("load", "l01");
        let train = name_of("train", "t01");
        let bindings = vec![
            ChannelBinding {
                position: 1,
                filename: "a.csv".into(),
                source: ChannelSource::Wired {
                    process: load.process_label(),
                    output: 1,
                },
            },
            ChannelBinding {
                position: 2,
                filename: "b.csv".into(),
                source: ChannelSource::Raw,
            },
        ];

        let mut composer = Composer::new();
        composer.add_step(&ComposedStep {
            name: &load,
            filename: "/h/load.py",
            runtime: "/envs/a",
            cpu: Some(2),
            inputs: &[],
            outputs: &["a.csv"],
            bindings: &[],
        });
        composer.add_step(&ComposedStep {
            name: &train,
            filename: "/h/train.py",
            runtime: "",
            cpu: None,
            inputs: &["a.csv", "b.csv"],
            outputs: &[],
            bindings: &bindings,
        });
        assert_eq!(composer.step_count(), 2);

        let sections = composer.into_sections();
        assert_eq!(
            sections.imports,
            vec![
                "include  { LOADL01 } from \"./modules/loadL01\"",
                "include  { TRAINT01 } from \"./modules/trainT01\"",
            ]
        );
        assert_eq!(
            sections.params,
            vec![
                "params.loadL01_filename=\"/h/load.py\"",
                "params.loadL01_runtime =\"/envs/a\"",
                "params.loadL01_cpu=\"2\"",
                "params.loadL01_output1=\"a.csv\"",
                "",
                "params.trainT01_filename=\"/h/train.py\"",
                "params.trainT01_runtime =\"\"",
                "params.trainT01_cpu=\"\"",
                "params.trainT01_input1=\"a.csv\"",
                "params.trainT01_input2=\"b.csv\"",
            ]
        );
        assert_eq!(
            sections.workflow,
            vec![
                "LOADL01()",
                "",
                "trainT01_channel_input1=LOADL01.out.output1.collect()",
                "trainT01_channel_input2=Channel.fromPath(params.trainT01_input2).toSortedList()",
                "",
                "TRAINT01(trainT01_channel_input1, trainT01_channel_input2)",
            ]
        );
    }

    #[test]
    fn empty_composer_has_empty_sections() {
        assert_eq!(Composer::new().into_sections(), TemplateSections::default());
    }
}
