use super::StackBuilder;
use super::frontend::FrontendRefs;
use super::load_balancer::LoadBalancerRefs;
use crate::error::Result;
use crate::template::Output;
use crate::template::intrinsic::{get_att, join};
use serde_json::json;

pub(crate) fn synth_outputs(
    b: &mut StackBuilder<'_>,
    lb: &LoadBalancerRefs,
    frontend: &FrontendRefs,
) -> Result<()> {
    let names = b.stack.outputs.clone();

    b.template.add_output(
        names.alb_dns_name,
        Output::new(get_att(&lb.alb, "DNSName"))
            .with_description("ALB DNS name, use this to test the APIs directly"),
    )?;
    b.template.add_output(
        names.cloudfront_url,
        Output::new(join(
            "",
            vec![json!("https://"), get_att(&frontend.distribution, "DomainName")],
        ))
        .with_description("Frontend URL"),
    )?;

    Ok(())
}
