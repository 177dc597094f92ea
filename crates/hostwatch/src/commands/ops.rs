//! One-shot operations fanned out over the selected devices.

use tracing::info;

use hostwatch_core::{Operation, Request, SensorValue, TargetSelection};

use crate::cli::{Command, GlobalOpts, PollArgs, SetArgs};
use crate::error::CliError;
use crate::output;

use super::{Context, SetupMode, build_hub, device_selection, setup};

pub async fn handle(cmd: Command, ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    let (hub, _registry) = build_hub(ctx, &global.devices)?;
    let hub_ids: Vec<String> = hub.devices().iter().map(|d| d.id().to_owned()).collect();
    let request = build_request(cmd, global, &hub_ids)?;

    setup(&hub, SetupMode::Dispatch).await;
    let result = hub.dispatch(&request).await;
    hub.shutdown_all().await;
    let result = result?;

    info!(
        operation = result.operation,
        succeeded = result.succeeded(),
        failed = result.failed(),
        "operation finished"
    );
    let out = output::render_aggregate(ctx.format, &result, ctx.color)?;
    output::print_output(&out, ctx.quiet);

    if result.all_succeeded() {
        Ok(())
    } else {
        Err(CliError::PartialFailure {
            failed: result.failed(),
            total: result.results.len(),
        })
    }
}

fn build_request(
    cmd: Command,
    global: &GlobalOpts,
    hub_ids: &[String],
) -> Result<Request, CliError> {
    let whole = |operation| Ok(Request::new(operation, device_selection(global)));
    match cmd {
        Command::Exec(args) => whole(Operation::ExecuteCommand {
            command: args.command,
            variables: args.vars.into_iter().collect(),
            timeout: args.timeout,
        }),
        Command::Action(args) => whole(Operation::RunAction {
            key: args.key,
            variables: args.vars.into_iter().collect(),
        }),
        Command::Poll(args) => Ok(poll_request(args, global, hub_ids)),
        Command::Set(args) => set_request(args, global, hub_ids),
        Command::On => whole(Operation::TurnOn),
        Command::Off => whole(Operation::TurnOff),
        Command::Restart => whole(Operation::Restart),
        Command::Devices | Command::Watch => Err(CliError::Internal(
            "not a dispatched operation".into(),
        )),
    }
}

/// Devices bare keys are qualified against.
fn scope<'a>(global: &'a GlobalOpts, hub_ids: &'a [String]) -> &'a [String] {
    if global.devices.is_empty() {
        hub_ids
    } else {
        &global.devices
    }
}

/// Bare keys are polled on every selected device; `device.key` ids are
/// taken as given.
fn poll_request(args: PollArgs, global: &GlobalOpts, hub_ids: &[String]) -> Request {
    if args.keys.is_empty() {
        return Request::new(Operation::PollSensors, device_selection(global));
    }
    let mut ids = Vec::new();
    for key in args.keys {
        if key.contains('.') {
            ids.push(key);
        } else {
            ids.extend(scope(global, hub_ids).iter().map(|d| format!("{d}.{key}")));
        }
    }
    Request::new(Operation::PollSensors, TargetSelection::Entities(ids))
}

/// Keys pair positionally with values. A bare key needs exactly one
/// device in scope.
fn set_request(args: SetArgs, global: &GlobalOpts, hub_ids: &[String]) -> Result<Request, CliError> {
    if args.keys.len() != args.values.len() {
        return Err(CliError::Validation {
            field: "value".into(),
            reason: format!(
                "{} keys but {} values; pass one --value per --key",
                args.keys.len(),
                args.values.len()
            ),
        });
    }

    let scope = scope(global, hub_ids);
    let ids = args
        .keys
        .into_iter()
        .map(|key| {
            if key.contains('.') {
                return Ok(key);
            }
            match scope {
                [device] => Ok(format!("{device}.{key}")),
                _ => Err(CliError::Validation {
                    field: "key".into(),
                    reason: format!(
                        "'{key}' is ambiguous; write it as DEVICE.{key} or pass one --device"
                    ),
                }),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    let values = args.values.into_iter().map(SensorValue::Text).collect();
    Ok(Request::new(
        Operation::SetSensorValues { values },
        TargetSelection::Entities(ids),
    ))
}
