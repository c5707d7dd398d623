use crate::handlers::{commands, instances};
use crate::routes::public;
use crate::version::VersionInfo;
use ollama_vm_common::{
    CreateInstanceRequest, CreateInstanceResponse, ExecuteCommandRequest, InstanceStatusResponse,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        instances::create_instance,
        instances::get_instance_status,
        commands::execute_ollama_command,
        public::get_version
    ),
    components(
        schemas(
            CreateInstanceRequest,
            CreateInstanceResponse,
            InstanceStatusResponse,
            ExecuteCommandRequest,
            VersionInfo
        )
    ),
    tags(
        (name = "ollama-vm", description = "Provision Ollama VMs and relay inference commands")
    )
)]
pub struct ApiDoc;
