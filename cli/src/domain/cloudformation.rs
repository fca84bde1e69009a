//! CloudFormation template for the legacy AWS infrastructure path.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde_json::{Map, Value, json};

use crate::domain::load_balancer::LbType;
use crate::domain::outputs::{self, Outputs};

/// What the stack template is built from.
#[derive(Debug, Clone, Default)]
pub struct TemplateInput<'a> {
    pub env_id: &'a str,
    /// Pin the BOSH subnet to this availability zone instead of the region's first.
    pub bosh_az: Option<&'a str>,
    pub lb: Option<LbType>,
    pub certificate_arn: Option<&'a str>,
}

/// Stack output names mapped onto canonical output keys.
const OUTPUT_KEYS: &[(&str, &str)] = &[
    ("VPCID", outputs::VPC_ID),
    ("BOSHSubnet", outputs::SUBNET_ID),
    ("BOSHSubnetAZ", outputs::AVAILABILITY_ZONE),
    ("BOSHEIP", outputs::EXTERNAL_IP),
    ("BOSHURL", outputs::DIRECTOR_ADDRESS),
    ("BOSHSecurityGroup", outputs::DEFAULT_SECURITY_GROUP),
    ("InternalSecurityGroup", outputs::INTERNAL_SECURITY_GROUP),
    ("BOSHUserAccessKey", outputs::BOSH_ACCESS_KEY_ID),
    ("BOSHUserSecretAccessKey", outputs::BOSH_SECRET_ACCESS_KEY),
    ("CFRouterLoadBalancer", outputs::CF_ROUTER_LB),
    ("CFRouterLoadBalancerURL", outputs::CF_ROUTER_LB_URL),
    ("CFRouterInternalSecurityGroup", outputs::CF_ROUTER_INTERNAL_SECURITY_GROUP),
    ("CFSSHProxyLoadBalancer", outputs::CF_SSH_PROXY_LB),
    ("CFSSHProxyLoadBalancerURL", outputs::CF_SSH_PROXY_LB_URL),
    ("CFSSHProxyInternalSecurityGroup", outputs::CF_SSH_PROXY_INTERNAL_SECURITY_GROUP),
    ("ConcourseLoadBalancer", outputs::CONCOURSE_LB),
    ("ConcourseLoadBalancerURL", outputs::CONCOURSE_LB_URL),
    ("ConcourseInternalSecurityGroup", outputs::CONCOURSE_INTERNAL_SECURITY_GROUP),
];

/// Build the stack template as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error when a load balancer is requested without a certificate ARN.
pub fn template(input: &TemplateInput<'_>) -> Result<String> {
    let mut resources = base_resources(input);
    let mut outputs = base_outputs();

    if let Some(lb) = input.lb {
        let arn = input
            .certificate_arn
            .filter(|arn| !arn.is_empty())
            .with_context(|| format!("{lb} load balancer requires an uploaded certificate"))?;
        match lb {
            LbType::Cf => {
                add_elb(&mut resources, &mut outputs, "CFRouter", &[
                    listener("HTTP", 80, "HTTP", 80, None),
                    listener("HTTPS", 443, "HTTP", 80, Some(arn)),
                    listener("SSL", 4443, "TCP", 80, Some(arn)),
                ], "HTTP:8080/health");
                add_elb(&mut resources, &mut outputs, "CFSSHProxy", &[
                    listener("TCP", 2222, "TCP", 2222, None),
                ], "TCP:2222");
            }
            LbType::Concourse => {
                add_elb(&mut resources, &mut outputs, "Concourse", &[
                    listener("TCP", 80, "TCP", 8080, None),
                    listener("SSL", 443, "TCP", 8080, Some(arn)),
                    listener("TCP", 2222, "TCP", 2222, None),
                ], "TCP:8080");
            }
        }
    }

    let document = json!({
        "AWSTemplateFormatVersion": "2010-09-09",
        "Description": format!("Infrastructure for a BOSH deployment ({}).", input.env_id),
        "Resources": resources,
        "Outputs": outputs,
    });
    serde_json::to_string_pretty(&document).context("serializing cloudformation template")
}

/// Translate stack outputs into canonical output keys, dropping unknown ones.
#[must_use]
pub fn normalize_outputs(stack_outputs: &BTreeMap<String, String>) -> Outputs {
    let mut normalized = Outputs::default();
    for (stack_key, canonical) in OUTPUT_KEYS {
        if let Some(value) = stack_outputs.get(*stack_key) {
            normalized.insert(*canonical, value.as_str());
        }
    }
    if normalized.find(outputs::DIRECTOR_ADDRESS).is_none()
        && let Some(ip) = normalized.find(outputs::EXTERNAL_IP)
    {
        let address = format!("https://{ip}:25555");
        normalized.insert(outputs::DIRECTOR_ADDRESS, address);
    }
    normalized
}

fn base_resources(input: &TemplateInput<'_>) -> Map<String, Value> {
    let az = input.bosh_az.map_or_else(
        || json!({ "Fn::Select": ["0", { "Fn::GetAZs": { "Ref": "AWS::Region" } }] }),
        |az| json!(az),
    );
    let tags = json!([{ "Key": "Name", "Value": input.env_id }]);

    let resources = json!({
        "VPC": {
            "Type": "AWS::EC2::VPC",
            "Properties": { "CidrBlock": "10.0.0.0/16", "Tags": tags },
        },
        "VPCGatewayInternetGateway": { "Type": "AWS::EC2::InternetGateway" },
        "VPCGatewayAttachment": {
            "Type": "AWS::EC2::VPCGatewayAttachment",
            "Properties": {
                "VpcId": { "Ref": "VPC" },
                "InternetGatewayId": { "Ref": "VPCGatewayInternetGateway" },
            },
        },
        "BOSHRouteTable": {
            "Type": "AWS::EC2::RouteTable",
            "Properties": { "VpcId": { "Ref": "VPC" } },
        },
        "BOSHRoute": {
            "Type": "AWS::EC2::Route",
            "DependsOn": "VPCGatewayAttachment",
            "Properties": {
                "DestinationCidrBlock": "0.0.0.0/0",
                "GatewayId": { "Ref": "VPCGatewayInternetGateway" },
                "RouteTableId": { "Ref": "BOSHRouteTable" },
            },
        },
        "BOSHSubnet": {
            "Type": "AWS::EC2::Subnet",
            "Properties": {
                "AvailabilityZone": az,
                "CidrBlock": outputs::INTERNAL_CIDR,
                "VpcId": { "Ref": "VPC" },
                "Tags": [{ "Key": "Name", "Value": format!("{}-bosh", input.env_id) }],
            },
        },
        "BOSHSubnetRouteTableAssociation": {
            "Type": "AWS::EC2::SubnetRouteTableAssociation",
            "Properties": {
                "RouteTableId": { "Ref": "BOSHRouteTable" },
                "SubnetId": { "Ref": "BOSHSubnet" },
            },
        },
        "InternalSecurityGroup": {
            "Type": "AWS::EC2::SecurityGroup",
            "Properties": {
                "VpcId": { "Ref": "VPC" },
                "GroupDescription": "Internal",
                "SecurityGroupEgress": [],
                "SecurityGroupIngress": [
                    { "IpProtocol": "icmp", "FromPort": "-1", "ToPort": "-1", "CidrIp": "0.0.0.0/0" },
                ],
            },
        },
        "InternalSecurityGroupIngressTCPfromBOSH": ingress("InternalSecurityGroup", "BOSHSecurityGroup", "tcp", "0", "65535"),
        "InternalSecurityGroupIngressUDPfromBOSH": ingress("InternalSecurityGroup", "BOSHSecurityGroup", "udp", "0", "65535"),
        "InternalSecurityGroupIngressTCPfromSelf": ingress("InternalSecurityGroup", "InternalSecurityGroup", "tcp", "0", "65535"),
        "InternalSecurityGroupIngressUDPfromSelf": ingress("InternalSecurityGroup", "InternalSecurityGroup", "udp", "0", "65535"),
        "BOSHSecurityGroup": {
            "Type": "AWS::EC2::SecurityGroup",
            "Properties": {
                "VpcId": { "Ref": "VPC" },
                "GroupDescription": "BOSH",
                "SecurityGroupEgress": [],
                "SecurityGroupIngress": [
                    { "CidrIp": "0.0.0.0/0", "IpProtocol": "tcp", "FromPort": "22", "ToPort": "22" },
                    { "CidrIp": "0.0.0.0/0", "IpProtocol": "tcp", "FromPort": "6868", "ToPort": "6868" },
                    { "CidrIp": "0.0.0.0/0", "IpProtocol": "tcp", "FromPort": "25555", "ToPort": "25555" },
                    { "SourceSecurityGroupId": { "Ref": "InternalSecurityGroup" }, "IpProtocol": "tcp", "FromPort": "0", "ToPort": "65535" },
                    { "SourceSecurityGroupId": { "Ref": "InternalSecurityGroup" }, "IpProtocol": "udp", "FromPort": "0", "ToPort": "65535" },
                ],
            },
        },
        "BOSHEIP": {
            "Type": "AWS::EC2::EIP",
            "DependsOn": "VPCGatewayAttachment",
            "Properties": { "Domain": "vpc" },
        },
        "BOSHUser": {
            "Type": "AWS::IAM::User",
            "Properties": {
                "UserName": format!("bosh-iam-user-{}", input.env_id),
                "Policies": [{
                    "PolicyName": "aws-cpi",
                    "PolicyDocument": {
                        "Version": "2012-10-17",
                        "Statement": [{
                            "Effect": "Allow",
                            "Action": [
                                "ec2:AssociateAddress", "ec2:AttachVolume", "ec2:CreateVolume",
                                "ec2:DeleteSnapshot", "ec2:DeleteVolume", "ec2:DescribeAddresses",
                                "ec2:DescribeImages", "ec2:DescribeInstances", "ec2:DescribeRegions",
                                "ec2:DescribeSecurityGroups", "ec2:DescribeSnapshots", "ec2:DescribeSubnets",
                                "ec2:DescribeVolumes", "ec2:DetachVolume", "ec2:CreateSnapshot",
                                "ec2:CreateTags", "ec2:RunInstances", "ec2:TerminateInstances",
                                "ec2:RegisterImage", "ec2:DeregisterImage",
                                "elasticloadbalancing:*",
                            ],
                            "Resource": "*",
                        }, {
                            "Effect": "Allow",
                            "Action": ["iam:PassRole"],
                            "Resource": "*",
                        }],
                    },
                }],
            },
        },
        "BOSHUserAccessKey": {
            "Type": "AWS::IAM::AccessKey",
            "Properties": { "UserName": { "Ref": "BOSHUser" } },
        },
    });
    match resources {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn base_outputs() -> Map<String, Value> {
    let outputs = json!({
        "VPCID": { "Value": { "Ref": "VPC" } },
        "BOSHSubnet": { "Value": { "Ref": "BOSHSubnet" } },
        "BOSHSubnetAZ": { "Value": { "Fn::GetAtt": ["BOSHSubnet", "AvailabilityZone"] } },
        "BOSHEIP": { "Value": { "Ref": "BOSHEIP" } },
        "BOSHURL": { "Value": { "Fn::Join": ["", ["https://", { "Ref": "BOSHEIP" }, ":25555"]] } },
        "BOSHSecurityGroup": { "Value": { "Ref": "BOSHSecurityGroup" } },
        "InternalSecurityGroup": { "Value": { "Ref": "InternalSecurityGroup" } },
        "BOSHUserAccessKey": { "Value": { "Ref": "BOSHUserAccessKey" } },
        "BOSHUserSecretAccessKey": { "Value": { "Fn::GetAtt": ["BOSHUserAccessKey", "SecretAccessKey"] } },
    });
    match outputs {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn ingress(group: &str, source: &str, protocol: &str, from: &str, to: &str) -> Value {
    json!({
        "Type": "AWS::EC2::SecurityGroupIngress",
        "Properties": {
            "GroupId": { "Ref": group },
            "SourceSecurityGroupId": { "Ref": source },
            "IpProtocol": protocol,
            "FromPort": from,
            "ToPort": to,
        },
    })
}

fn listener(protocol: &str, port: u16, instance_protocol: &str, instance_port: u16, arn: Option<&str>) -> Value {
    let mut listener = json!({
        "Protocol": protocol,
        "LoadBalancerPort": port.to_string(),
        "InstanceProtocol": instance_protocol,
        "InstancePort": instance_port.to_string(),
    });
    if let (Some(arn), Value::Object(map)) = (arn, &mut listener) {
        map.insert("SSLCertificateId".to_string(), json!(arn));
    }
    listener
}

/// Add an ELB named `<prefix>LoadBalancer` and its security groups.
fn add_elb(
    resources: &mut Map<String, Value>,
    outputs: &mut Map<String, Value>,
    prefix: &str,
    listeners: &[Value],
    health_check: &str,
) {
    let lb = format!("{prefix}LoadBalancer");
    let lb_group = format!("{prefix}SecurityGroup");
    let internal_group = format!("{prefix}InternalSecurityGroup");

    let ingress_rules: Vec<Value> = listeners
        .iter()
        .map(|l| {
            json!({
                "CidrIp": "0.0.0.0/0",
                "IpProtocol": "tcp",
                "FromPort": l["LoadBalancerPort"],
                "ToPort": l["LoadBalancerPort"],
            })
        })
        .collect();
    let internal_rules: Vec<Value> = listeners
        .iter()
        .map(|l| {
            json!({
                "SourceSecurityGroupId": { "Ref": lb_group },
                "IpProtocol": "tcp",
                "FromPort": l["InstancePort"],
                "ToPort": l["InstancePort"],
            })
        })
        .collect();

    resources.insert(
        lb_group.clone(),
        json!({
            "Type": "AWS::EC2::SecurityGroup",
            "Properties": {
                "VpcId": { "Ref": "VPC" },
                "GroupDescription": format!("{prefix} load balancer"),
                "SecurityGroupEgress": [],
                "SecurityGroupIngress": ingress_rules,
            },
        }),
    );
    resources.insert(
        internal_group.clone(),
        json!({
            "Type": "AWS::EC2::SecurityGroup",
            "Properties": {
                "VpcId": { "Ref": "VPC" },
                "GroupDescription": format!("{prefix} internal"),
                "SecurityGroupEgress": [],
                "SecurityGroupIngress": internal_rules,
            },
        }),
    );
    resources.insert(
        lb.clone(),
        json!({
            "Type": "AWS::ElasticLoadBalancing::LoadBalancer",
            "DependsOn": "VPCGatewayAttachment",
            "Properties": {
                "CrossZone": true,
                "Subnets": [{ "Ref": "BOSHSubnet" }],
                "SecurityGroups": [{ "Ref": lb_group }],
                "HealthCheck": {
                    "Target": health_check,
                    "HealthyThreshold": "5",
                    "UnhealthyThreshold": "2",
                    "Interval": "12",
                    "Timeout": "2",
                },
                "Listeners": listeners,
            },
        }),
    );

    outputs.insert(lb.clone(), json!({ "Value": { "Ref": lb } }));
    outputs.insert(
        format!("{lb}URL"),
        json!({ "Value": { "Fn::GetAtt": [lb, "DNSName"] } }),
    );
    outputs.insert(internal_group.clone(), json!({ "Value": { "Ref": internal_group } }));
}
